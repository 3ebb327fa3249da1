//! adapter-provider: runs collection for every discovered metric and
//! serves the results from the metric store.
//!
//! # Architecture
//!
//! ```text
//! MetricsProvider
//!   ├── reconcile(bindings) → start / restart / stop workers
//!   ├── Per-binding worker task
//!   │   ├── CollectorFactory → Box<dyn Collector>
//!   │   ├── get_metrics() every interval()
//!   │   └── insert into MetricStore
//!   └── run_housekeeping() → MetricStore::remove_expired
//! ```

pub mod error;
pub mod provider;

pub use error::{ProviderError, ProviderResult};
pub use provider::{MetricBinding, MetricsProvider, ReconcileSummary};
