//! adapter-store: the metric store behind the custom and external
//! metrics APIs.
//!
//! Collection workers insert values; API handlers read them. Reads never
//! reach a backend, so serving latency is independent of how slow a
//! backend is.
//!
//! # Layout
//!
//! ```text
//! MetricStore
//!   ├── custom:   (metric, group-resource, namespace, object) → StoredMetric
//!   ├── external: (metric, canonical labels)                  → StoredMetric
//!   └── remove_expired() ← periodic housekeeping sweep
//! ```
//!
//! Every entry expires `ttl` after its last insert.

pub mod error;
pub mod kinds;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use kinds::KindMap;
pub use store::{
    CustomKey, CustomMetricInfo, ExternalKey, ExternalMetricInfo, MetricStore, StoredMetric,
};
