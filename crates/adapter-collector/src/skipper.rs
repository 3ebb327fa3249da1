//! Ingress request-rate collectors.
//!
//! Request rates are read per ingress host from the time-series backend
//! the proxy reports to. The ingress is re-read on every cycle so host
//! changes are picked up without rebuilding the collector.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use adapter_core::{AutoscalerRef, CollectedMetric, MetricConfig, ObjectReference};

use crate::average::average_single;
use crate::cluster::{ClusterClient, ReplicaResolver};
use crate::collector::{dispatch, Collector, CollectorPlugin, MetricTable};
use crate::error::{CollectorError, CollectorResult};
use crate::max::MaxCollector;
use crate::prometheus::QUERY_KEY;

pub const REQUESTS_PER_SECOND_METRIC: &str = "requests-per-second";

/// Request rate of one host over the last minute.
pub fn rps_query(host: &str) -> String {
    let host = host.replace('.', "_");
    format!(r#"scalar(sum(rate(skipper_serve_host_duration_seconds_count{{host="{host}"}}[1m])))"#)
}

/// Builds ingress collectors on top of a time-series plugin.
#[derive(Clone)]
pub struct SkipperPlugin {
    cluster: Arc<dyn ClusterClient>,
    queries: Arc<dyn CollectorPlugin>,
    replicas: Arc<dyn ReplicaResolver>,
}

impl SkipperPlugin {
    pub const METRICS: MetricTable<Self> =
        &[(REQUESTS_PER_SECOND_METRIC, Self::requests_per_second)];

    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        queries: Arc<dyn CollectorPlugin>,
        replicas: Arc<dyn ReplicaResolver>,
    ) -> Self {
        Self {
            cluster,
            queries,
            replicas,
        }
    }

    fn requests_per_second(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        Ok(Box::new(SkipperCollector {
            plugin: self.clone(),
            hpa: hpa.clone(),
            config: config.clone(),
            interval,
        }))
    }
}

impl CollectorPlugin for SkipperPlugin {
    fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        dispatch(self, Self::METRICS, hpa, config, interval)
    }
}

/// Highest request rate across an ingress's hosts, averaged over the
/// autoscaler target's ready replicas.
pub struct SkipperCollector {
    plugin: SkipperPlugin,
    hpa: AutoscalerRef,
    config: MetricConfig,
    interval: Duration,
}

impl SkipperCollector {
    fn ingress(&self) -> &ObjectReference {
        &self.config.object_reference
    }

    /// One query collector per ingress host, combined by maximum when
    /// there is more than one.
    async fn host_collector(&self) -> CollectorResult<Box<dyn Collector>> {
        let ingress_ref = self.ingress();
        let ingress = self
            .plugin
            .cluster
            .get_ingress(&ingress_ref.namespace, &ingress_ref.name)
            .await?;

        let mut collectors = Vec::with_capacity(ingress.rules.len());
        for rule in &ingress.rules {
            let mut config = self.config.clone();
            config.config = [(QUERY_KEY.to_string(), rps_query(&rule.host))].into();
            // averaging happens once, after the hosts are combined
            config.per_replica = false;
            collectors.push(
                self.plugin
                    .queries
                    .new_collector(&self.hpa, &config, self.interval)?,
            );
        }

        match collectors.len() {
            0 => Err(CollectorError::NoHosts {
                namespace: ingress_ref.namespace.clone(),
                name: ingress_ref.name.clone(),
            }),
            1 => Ok(collectors.remove(0)),
            n => {
                debug!(ingress = %ingress_ref.name, hosts = n, "combining host rates");
                Ok(Box::new(MaxCollector::new(self.interval, collectors)))
            }
        }
    }
}

#[async_trait]
impl Collector for SkipperCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        let values = self.host_collector().await?.get_metrics().await?;
        average_single(values, self.plugin.replicas.as_ref(), &self.hpa).await
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}
