//! Error types for the metric store.

use thiserror::Error;

/// Result type alias for metric store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The described object's kind has no group-resource mapping, so the
    /// metric cannot be keyed.
    #[error("no group-resource mapping for kind {kind:?} (metric {metric})")]
    UnmappedKind { kind: String, metric: String },

    #[error("invalid store configuration: {0}")]
    Config(#[from] adapter_core::CoreError),
}
