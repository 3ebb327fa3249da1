//! Provider error types.

use thiserror::Error;

use adapter_collector::CollectorError;
use adapter_store::StoreError;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The binding's collector could not be built. Nothing was scheduled.
    #[error("failed to create collector for {id}: {source}")]
    Collector {
        id: String,
        #[source]
        source: CollectorError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid provider configuration: {0}")]
    Config(#[from] adapter_core::CoreError),
}
