//! Time-series backend collectors.
//!
//! Runs one instant query per cycle and reports the result as a single
//! value. Any metric name is accepted; the query comes from the metric's
//! `query` config key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use adapter_core::{
    AutoscalerRef, CollectedMetric, CustomMetricValue, Labels, MetricConfig, MetricSourceType,
    ObjectReference, Quantity,
};

use crate::average::AverageCollector;
use crate::backend::QueryClient;
use crate::cluster::ReplicaResolver;
use crate::collector::{Collector, CollectorPlugin};
use crate::error::{CollectorError, CollectorResult};

/// Config key holding the query expression.
pub const QUERY_KEY: &str = "query";

/// Builds [`PrometheusCollector`]s bound to a shared query client.
#[derive(Clone)]
pub struct PrometheusPlugin {
    client: Arc<dyn QueryClient>,
    replicas: Arc<dyn ReplicaResolver>,
}

impl PrometheusPlugin {
    pub fn new(client: Arc<dyn QueryClient>, replicas: Arc<dyn ReplicaResolver>) -> Self {
        Self { client, replicas }
    }
}

impl CollectorPlugin for PrometheusPlugin {
    fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        let collector = PrometheusCollector::new(self.client.clone(), config, interval)?;
        if config.per_replica {
            return Ok(Box::new(AverageCollector::new(
                Box::new(collector),
                self.replicas.clone(),
                hpa.clone(),
            )));
        }
        Ok(Box::new(collector))
    }
}

/// Evaluates one query per cycle.
pub struct PrometheusCollector {
    client: Arc<dyn QueryClient>,
    query: String,
    metric_name: String,
    metric_type: MetricSourceType,
    object: ObjectReference,
    labels: Labels,
    interval: Duration,
}

impl PrometheusCollector {
    pub fn new(
        client: Arc<dyn QueryClient>,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Self> {
        let query = config
            .config
            .get(QUERY_KEY)
            .cloned()
            .ok_or(CollectorError::MissingConfig {
                backend: "Prometheus",
                key: QUERY_KEY,
            })?;

        Ok(Self {
            client,
            query,
            metric_name: config.name.clone(),
            metric_type: config.metric_type,
            object: config.object_reference.clone(),
            labels: config.labels.clone(),
            interval,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

#[async_trait]
impl Collector for PrometheusCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        let sample = self.client.query(&self.query).await?;
        let value = Quantity::from_f64(sample)
            .ok_or_else(|| CollectorError::InvalidNumber(sample.to_string()))?;
        debug!(metric = %self.metric_name, %value, "query evaluated");

        let value = CustomMetricValue {
            described_object: self.object.clone(),
            metric_name: self.metric_name.clone(),
            timestamp: Utc::now(),
            value,
        };
        Ok(vec![CollectedMetric::custom(
            self.metric_type,
            value,
            self.labels.clone(),
        )])
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}
