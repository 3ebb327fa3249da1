//! Error types shared by the adapter core types.

use thiserror::Error;

/// Result type alias for core parsing and config operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid label selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
