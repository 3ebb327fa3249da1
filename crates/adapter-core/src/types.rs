//! Domain types shared by collectors, the metric store and the provider.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::Labels;
use crate::quantity::Quantity;

// ── Object references ─────────────────────────────────────────────

/// An (API group, resource) pair, e.g. `extensions/ingresses`.
///
/// The core group is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupResource {
    #[serde(default)]
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    pub fn core(resource: impl Into<String>) -> Self {
        Self::new("", resource)
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// The object a custom metric describes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub api_version: String,
}

/// Reference to the workload an autoscaler scales.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossVersionObjectReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub api_version: String,
}

/// The autoscaler a collector is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutoscalerRef {
    pub namespace: String,
    pub name: String,
    pub scale_target: CrossVersionObjectReference,
}

impl fmt::Display for AutoscalerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Metric configuration ──────────────────────────────────────────

/// Where a metric comes from, as seen by the autoscaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricSourceType {
    Object,
    Pods,
    External,
}

impl fmt::Display for MetricSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricSourceType::Object => "Object",
            MetricSourceType::Pods => "Pods",
            MetricSourceType::External => "External",
        })
    }
}

/// Everything a plugin needs to build a collector for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric name as requested by the autoscaler.
    pub name: String,
    pub metric_type: MetricSourceType,
    /// Described object for Object metrics; ignored for External ones.
    #[serde(default)]
    pub object_reference: ObjectReference,
    /// Registered object collector to use (e.g. "prometheus"). Empty
    /// selects the collector registered for the object kind.
    #[serde(default)]
    pub collector_type: String,
    /// Backend-specific settings such as a query string.
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Backend identifiers (check id, queue name, …). Also attached to
    /// external metric values.
    #[serde(default)]
    pub labels: Labels,
    /// Divide the collected value by the scale target's ready replicas.
    #[serde(default)]
    pub per_replica: bool,
    /// Collection interval override.
    #[serde(default, with = "optional_duration")]
    pub interval: Option<Duration>,
}

impl MetricConfig {
    pub fn new(name: impl Into<String>, metric_type: MetricSourceType) -> Self {
        Self {
            name: name.into(),
            metric_type,
            object_reference: ObjectReference::default(),
            collector_type: String::new(),
            config: HashMap::new(),
            labels: Labels::new(),
            per_replica: false,
            interval: None,
        }
    }

    pub fn with_object(mut self, object: ObjectReference) -> Self {
        self.object_reference = object;
        self
    }

    pub fn with_collector_type(mut self, collector_type: impl Into<String>) -> Self {
        self.collector_type = collector_type.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_per_replica(mut self, per_replica: bool) -> Self {
        self.per_replica = per_replica;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

mod optional_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::config::{format_duration, parse_duration};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ── Collected values ──────────────────────────────────────────────

/// A custom metric value describing one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMetricValue {
    pub described_object: ObjectReference,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: Quantity,
}

/// A metric value not tied to any cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMetricValue {
    pub metric_name: String,
    pub metric_labels: Labels,
    pub timestamp: DateTime<Utc>,
    pub value: Quantity,
}

/// One value produced by a collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectedMetric {
    Object {
        value: CustomMetricValue,
        labels: Labels,
    },
    Pods {
        value: CustomMetricValue,
        labels: Labels,
    },
    External(ExternalMetricValue),
}

impl CollectedMetric {
    /// Build a custom value of the given source type. `External` is not a
    /// custom source and yields an external value keyed by `labels`.
    pub fn custom(
        metric_type: MetricSourceType,
        value: CustomMetricValue,
        labels: Labels,
    ) -> Self {
        match metric_type {
            MetricSourceType::Object => CollectedMetric::Object { value, labels },
            MetricSourceType::Pods => CollectedMetric::Pods { value, labels },
            MetricSourceType::External => CollectedMetric::External(ExternalMetricValue {
                metric_name: value.metric_name,
                metric_labels: labels,
                timestamp: value.timestamp,
                value: value.value,
            }),
        }
    }

    pub fn metric_type(&self) -> MetricSourceType {
        match self {
            CollectedMetric::Object { .. } => MetricSourceType::Object,
            CollectedMetric::Pods { .. } => MetricSourceType::Pods,
            CollectedMetric::External(_) => MetricSourceType::External,
        }
    }

    pub fn metric_name(&self) -> &str {
        match self {
            CollectedMetric::Object { value, .. } | CollectedMetric::Pods { value, .. } => {
                &value.metric_name
            }
            CollectedMetric::External(value) => &value.metric_name,
        }
    }

    pub fn quantity(&self) -> Quantity {
        match self {
            CollectedMetric::Object { value, .. } | CollectedMetric::Pods { value, .. } => {
                value.value
            }
            CollectedMetric::External(value) => value.value,
        }
    }

    /// The same metric carrying a different quantity.
    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        match &mut self {
            CollectedMetric::Object { value, .. } | CollectedMetric::Pods { value, .. } => {
                value.value = quantity
            }
            CollectedMetric::External(value) => value.value = quantity,
        }
        self
    }

    pub fn labels(&self) -> &Labels {
        match self {
            CollectedMetric::Object { labels, .. } | CollectedMetric::Pods { labels, .. } => {
                labels
            }
            CollectedMetric::External(value) => &value.metric_labels,
        }
    }
}
