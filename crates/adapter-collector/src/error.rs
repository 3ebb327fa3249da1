//! Collector error types.

use thiserror::Error;

use adapter_core::CoreError;

/// Result type alias for collector construction and collection.
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors raised while building a collector or running a collection
/// cycle.
///
/// Configuration errors surface when a plugin builds a collector; the
/// remaining variants surface from `get_metrics` and only cost the
/// current cycle.
#[derive(Debug, Error)]
pub enum CollectorError {
    // ── configuration ──
    #[error("metric '{0}' not supported")]
    UnsupportedMetric(String),

    #[error("{backend} {label} not specified on metric")]
    MissingLabel {
        backend: &'static str,
        label: &'static str,
    },

    #[error("{backend} config key '{key}' not specified on metric")]
    MissingConfig {
        backend: &'static str,
        key: &'static str,
    },

    #[error("no queue client configured for region '{0}'")]
    UnknownRegion(String),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("no collector plugin found for metric '{metric}' ({source_type})")]
    NoPlugin { metric: String, source_type: String },

    #[error(transparent)]
    Config(#[from] CoreError),

    // ── backend I/O ──
    #[error("backend error: {0}")]
    Backend(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("failed to get queue length for '{0}'")]
    MissingAttribute(String),

    #[error("invalid numeric value: {0}")]
    InvalidNumber(String),

    #[error("event type '{event_type}' not found in subscription '{subscription}'")]
    UnknownEventType {
        subscription: String,
        event_type: String,
    },

    #[error("cluster api error: {0}")]
    Cluster(String),

    // ── aggregation ──
    #[error("no hosts defined on ingress {namespace}/{name}, unable to create collector")]
    NoHosts { namespace: String, name: String },

    #[error("no collectors configured")]
    NoDelegates,

    #[error("no metric values collected")]
    NoValues,

    #[error("expected to only get one metric value, got {0}")]
    UnexpectedValueCount(usize),

    #[error("unable to get average value for {0} replicas")]
    InsufficientReplicas(i32),
}

impl CollectorError {
    /// Whether this error comes from the metric configuration rather than
    /// a backend. Configuration errors will not go away on retry.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CollectorError::UnsupportedMetric(_)
                | CollectorError::MissingLabel { .. }
                | CollectorError::MissingConfig { .. }
                | CollectorError::UnknownRegion(_)
                | CollectorError::InvalidEndpoint { .. }
                | CollectorError::NoPlugin { .. }
                | CollectorError::Config(_)
        )
    }
}
