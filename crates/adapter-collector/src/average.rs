//! Per-replica averaging.
//!
//! Turns a fleet-wide value (total requests per second, say) into a
//! per-instance value by dividing by the scale target's ready replicas.
//! The division happens in milli-units.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use adapter_core::{AutoscalerRef, CollectedMetric};

use crate::cluster::ReplicaResolver;
use crate::collector::Collector;
use crate::error::{CollectorError, CollectorResult};

/// Divide `metric` by `replicas`. Fails for fewer than one replica.
pub fn average_per_replica(metric: CollectedMetric, replicas: i32) -> CollectorResult<CollectedMetric> {
    if replicas < 1 {
        return Err(CollectorError::InsufficientReplicas(replicas));
    }
    let average = metric
        .quantity()
        .div_by(i64::from(replicas))
        .ok_or(CollectorError::InsufficientReplicas(replicas))?;
    Ok(metric.with_quantity(average))
}

/// Require exactly one value in `values`, look up the target's ready
/// replicas and return the per-replica average.
pub(crate) async fn average_single(
    mut values: Vec<CollectedMetric>,
    replicas: &dyn ReplicaResolver,
    hpa: &AutoscalerRef,
) -> CollectorResult<Vec<CollectedMetric>> {
    if values.len() != 1 {
        return Err(CollectorError::UnexpectedValueCount(values.len()));
    }
    let Some(value) = values.pop() else {
        return Err(CollectorError::NoValues);
    };

    let count = replicas.ready_replicas(hpa).await?;
    let averaged = average_per_replica(value, count)?;
    debug!(hpa = %hpa, replicas = count, value = %averaged.quantity(), "per-replica average");
    Ok(vec![averaged])
}

/// Wraps a single-value collector and averages its result over the
/// autoscaler target's ready replicas.
pub struct AverageCollector {
    delegate: Box<dyn Collector>,
    replicas: Arc<dyn ReplicaResolver>,
    hpa: AutoscalerRef,
}

impl AverageCollector {
    pub fn new(
        delegate: Box<dyn Collector>,
        replicas: Arc<dyn ReplicaResolver>,
        hpa: AutoscalerRef,
    ) -> Self {
        Self {
            delegate,
            replicas,
            hpa,
        }
    }
}

#[async_trait]
impl Collector for AverageCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        let values = self.delegate.get_metrics().await?;
        average_single(values, self.replicas.as_ref(), &self.hpa).await
    }

    fn interval(&self) -> Duration {
        self.delegate.interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deployment_hpa, external_value, FakeCluster, FixedCollector};
    use crate::cluster::ScaleTargetReplicas;
    use adapter_core::Quantity;

    #[test]
    fn divides_in_milli_units() {
        let metric = external_value("rps", Quantity::from_milli(900));
        let averaged = average_per_replica(metric, 3).unwrap();
        assert_eq!(averaged.quantity().milli_value(), 300);
    }

    #[test]
    fn truncates_remainders() {
        let metric = external_value("rps", Quantity::from_int(10));
        let averaged = average_per_replica(metric, 3).unwrap();
        assert_eq!(averaged.quantity().milli_value(), 3333);
    }

    #[test]
    fn zero_replicas_fail() {
        let metric = external_value("rps", Quantity::from_int(900));
        let err = average_per_replica(metric, 0).unwrap_err();
        assert!(matches!(err, CollectorError::InsufficientReplicas(0)));
    }

    #[tokio::test]
    async fn wraps_delegate() {
        let cluster = Arc::new(FakeCluster::default().with_deployment("default", "app", 3));
        let collector = AverageCollector::new(
            Box::new(FixedCollector::values(vec![external_value("rps", Quantity::from_milli(900))])),
            Arc::new(ScaleTargetReplicas::new(cluster)),
            deployment_hpa("app"),
        );

        let values = collector.get_metrics().await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].quantity().milli_value(), 300);
        assert_eq!(collector.interval(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn rejects_multiple_values() {
        let cluster = Arc::new(FakeCluster::default().with_deployment("default", "app", 3));
        let collector = AverageCollector::new(
            Box::new(FixedCollector::values(vec![
                external_value("rps", Quantity::from_int(1)),
                external_value("rps", Quantity::from_int(2)),
            ])),
            Arc::new(ScaleTargetReplicas::new(cluster)),
            deployment_hpa("app"),
        );

        let err = collector.get_metrics().await.unwrap_err();
        assert!(matches!(err, CollectorError::UnexpectedValueCount(2)));
    }

    #[tokio::test]
    async fn unsupported_target_kind_has_no_replicas() {
        let cluster = Arc::new(FakeCluster::default());
        let mut hpa = deployment_hpa("app");
        hpa.scale_target.kind = "ReplicaSet".into();

        let collector = AverageCollector::new(
            Box::new(FixedCollector::values(vec![external_value("rps", Quantity::from_int(9))])),
            Arc::new(ScaleTargetReplicas::new(cluster)),
            hpa,
        );

        let err = collector.get_metrics().await.unwrap_err();
        assert!(matches!(err, CollectorError::InsufficientReplicas(0)));
    }

    #[tokio::test]
    async fn stateful_set_targets_are_supported() {
        let cluster = Arc::new(FakeCluster::default().with_stateful_set("default", "db", 2));
        let mut hpa = deployment_hpa("db");
        hpa.scale_target.kind = "StatefulSet".into();

        let resolver = ScaleTargetReplicas::new(cluster);
        assert_eq!(resolver.ready_replicas(&hpa).await.unwrap(), 2);
    }
}
