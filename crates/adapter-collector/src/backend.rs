//! Client handles the collectors query.
//!
//! Implementations are shared between collectors and must be safe for
//! concurrent use. Request timeouts are part of the client's
//! configuration and surface as ordinary errors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CollectorResult;

/// Runs instant queries against a time-series engine.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Evaluate `query` and return its single numeric result.
    async fn query(&self, query: &str) -> CollectorResult<f64>;
}

/// Reads results of an external check service.
#[async_trait]
pub trait CheckClient: Send + Sync {
    /// Latest datapoint of check `check_id` for result key `key`, looking
    /// back at most `window`.
    async fn latest(&self, check_id: &str, key: &str, window: Duration) -> CollectorResult<f64>;
}

/// Reads attributes of a message queue.
///
/// No network-backed implementation ships with this crate: the embedding
/// service wraps its cloud SDK's queue client in this trait and hands one
/// instance per region to [`AwsPlugin::from_config`](crate::AwsPlugin::from_config).
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn get_queue_attributes(
        &self,
        queue_name: &str,
        attributes: &[&str],
    ) -> CollectorResult<HashMap<String, String>>;
}

/// Consumption state of one event type within a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventTypeStats {
    pub event_type: String,
    #[serde(default)]
    pub partitions: Vec<PartitionStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PartitionStats {
    pub partition: String,
    #[serde(default)]
    pub unconsumed_events: i64,
    #[serde(default)]
    pub consumer_lag_seconds: i64,
}

/// Reads statistics of an event-stream subscription.
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    /// Per-event-type statistics of `subscription_id`, including
    /// consumer time lag.
    async fn stats(&self, subscription_id: &str) -> CollectorResult<Vec<EventTypeStats>>;
}

/// Supplies bearer tokens for backend requests.
///
/// Refreshing is the source's business; callers ask for a token on every
/// request and never cache it.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> CollectorResult<String>;
}

/// A token source that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> CollectorResult<String> {
        Ok(self.0.clone())
    }
}
