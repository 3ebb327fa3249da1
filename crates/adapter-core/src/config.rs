//! Adapter configuration parser.
//!
//! Every section is optional; missing values fall back to the defaults
//! below.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::GroupResource;

pub const DEFAULT_TTL: &str = "15m";
pub const DEFAULT_HOUSEKEEPING_INTERVAL: &str = "1m";
pub const DEFAULT_COLLECTION_INTERVAL: &str = "30s";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    pub prometheus: Option<EndpointConfig>,
    pub zmon: Option<EndpointConfig>,
    pub nakadi: Option<EndpointConfig>,
    pub aws: Option<AwsConfig>,
    /// Extra object kind → group-resource mappings for custom metrics.
    #[serde(default)]
    pub kinds: BTreeMap<String, GroupResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_ttl")]
    pub ttl: String,
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            housekeeping_interval: default_housekeeping_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_collection_interval")]
    pub default_interval: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            default_interval: default_collection_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint: String,
    /// Request timeout (e.g. "10s").
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    pub regions: Vec<String>,
}

fn default_ttl() -> String {
    DEFAULT_TTL.to_string()
}

fn default_housekeeping_interval() -> String {
    DEFAULT_HOUSEKEEPING_INTERVAL.to_string()
}

fn default_collection_interval() -> String {
    DEFAULT_COLLECTION_INTERVAL.to_string()
}

impl AdapterConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: AdapterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every duration string parses and that periods are non-zero.
    pub fn validate(&self) -> CoreResult<()> {
        non_zero("store.ttl", self.ttl()?)?;
        non_zero("store.housekeeping_interval", self.housekeeping_interval()?)?;
        non_zero("collection.default_interval", self.default_interval()?)?;
        for endpoint in [&self.prometheus, &self.zmon, &self.nakadi].into_iter().flatten() {
            endpoint.timeout()?;
        }
        Ok(())
    }

    pub fn ttl(&self) -> CoreResult<Duration> {
        parse_duration(&self.store.ttl)
    }

    pub fn housekeeping_interval(&self) -> CoreResult<Duration> {
        parse_duration(&self.store.housekeeping_interval)
    }

    pub fn default_interval(&self) -> CoreResult<Duration> {
        parse_duration(&self.collection.default_interval)
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> CoreResult<Option<Duration>> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }
}

/// Parse a duration string like "500ms", "30s", "15m", "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let invalid = || CoreError::InvalidDuration(s.to_string());

    let (digits, unit_ms): (&str, u64) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

/// Reject a zero period; `field` names the setting in the error.
pub fn non_zero(field: &'static str, d: Duration) -> CoreResult<Duration> {
    if d.is_zero() {
        Err(CoreError::ZeroDuration(field))
    } else {
        Ok(d)
    }
}

/// Render a duration in the largest whole unit `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else if ms % 3_600_000 == 0 && ms > 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 && ms > 0 {
        format!("{}m", ms / 60_000)
    } else {
        format!("{}s", ms / 1000)
    }
}
