//! adapter-core: shared types for the metrics adapter.
//!
//! Holds the vocabulary every other crate speaks: metric configurations
//! handed to collector plugins, the values collectors produce, fixed-point
//! quantities, label selectors, and the TOML configuration.

pub mod config;
pub mod error;
pub mod labels;
pub mod quantity;
pub mod types;

pub use config::AdapterConfig;
pub use error::{CoreError, CoreResult};
pub use labels::{canonical_labels, Labels, Requirement, Selector};
pub use quantity::Quantity;
pub use types::*;
