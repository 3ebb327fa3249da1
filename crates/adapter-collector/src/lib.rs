//! adapter-collector: metric acquisition for the metrics adapter.
//!
//! A [`Collector`] fetches metric values from one backend; a
//! [`CollectorPlugin`] validates a metric configuration and builds the
//! collector for it. The [`CollectorFactory`] routes configurations to
//! plugins.
//!
//! Backends:
//! - time-series queries ([`prometheus`])
//! - check-service results ([`zmon`])
//! - queue depth ([`aws`])
//! - event-stream subscription backlog and lag ([`nakadi`])
//! - ingress request rates built on time-series queries ([`skipper`])
//!
//! Composites ([`MaxCollector`], [`AverageCollector`]) combine or rescale
//! other collectors' values.

pub mod average;
pub mod aws;
pub mod backend;
pub mod cluster;
pub mod collector;
pub mod error;
pub mod factory;
pub mod http;
pub mod max;
pub mod nakadi;
pub mod prometheus;
pub mod skipper;
pub mod zmon;

#[cfg(test)]
mod testing;

pub use average::{average_per_replica, AverageCollector};
pub use aws::{AwsPlugin, SqsCollector, SQS_QUEUE_LENGTH_METRIC};
pub use backend::{
    CheckClient, EventTypeStats, PartitionStats, QueryClient, QueueClient, StaticToken,
    SubscriptionClient, TokenSource,
};
pub use cluster::{ClusterClient, Ingress, IngressRule, ReplicaResolver, ScaleTargetReplicas, WorkloadStatus};
pub use collector::{metric_names, Collector, CollectorPlugin, Constructor, MetricTable};
pub use error::{CollectorError, CollectorResult};
pub use factory::CollectorFactory;
pub use http::{Endpoint, KairosClient, NakadiClient, PrometheusClient};
pub use max::MaxCollector;
pub use nakadi::{
    NakadiCollector, NakadiPlugin, SubscriptionStat, NAKADI_CONSUMER_LAG_SECONDS_METRIC,
    NAKADI_UNCONSUMED_EVENTS_METRIC,
};
pub use prometheus::{PrometheusCollector, PrometheusPlugin};
pub use skipper::{rps_query, SkipperCollector, SkipperPlugin, REQUESTS_PER_SECOND_METRIC};
pub use zmon::{ZmonCollector, ZmonPlugin, ZMON_CHECK_METRIC};
