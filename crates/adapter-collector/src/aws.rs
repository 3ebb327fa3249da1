//! Queue-depth collectors.
//!
//! The plugin holds one queue client per region. A metric names its queue
//! and region through labels; a region without a client is rejected when
//! the collector is built.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use adapter_core::config::AwsConfig;
use adapter_core::{
    AutoscalerRef, CollectedMetric, ExternalMetricValue, Labels, MetricConfig, Quantity,
};

use crate::backend::QueueClient;
use crate::collector::{dispatch, Collector, CollectorPlugin, MetricTable};
use crate::error::{CollectorError, CollectorResult};

pub const SQS_QUEUE_LENGTH_METRIC: &str = "sqs-queue-length";

const QUEUE_NAME_LABEL: &str = "queue-name";
const REGION_LABEL: &str = "region";
const LENGTH_ATTRIBUTE: &str = "ApproximateNumberOfMessages";

/// Builds queue collectors from a region → client map.
#[derive(Clone, Default)]
pub struct AwsPlugin {
    clients: HashMap<String, Arc<dyn QueueClient>>,
}

impl AwsPlugin {
    pub const METRICS: MetricTable<Self> =
        &[(SQS_QUEUE_LENGTH_METRIC, Self::queue_length_collector)];

    pub fn new() -> Self {
        Self::default()
    }

    /// One client per configured region, built by `client_for`.
    pub fn from_config<F>(config: &AwsConfig, mut client_for: F) -> Self
    where
        F: FnMut(&str) -> Arc<dyn QueueClient>,
    {
        config
            .regions
            .iter()
            .fold(Self::new(), |plugin, region| {
                let client = client_for(region.as_str());
                plugin.with_region(region.as_str(), client)
            })
    }

    /// Register the client serving `region`, replacing any previous one.
    pub fn with_region(mut self, region: impl Into<String>, client: Arc<dyn QueueClient>) -> Self {
        let region = region.into();
        info!(region = %region, "queue client registered");
        self.clients.insert(region, client);
        self
    }

    pub fn regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        regions.sort_unstable();
        regions
    }

    fn queue_length_collector(
        &self,
        _hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        let region = config
            .labels
            .get(REGION_LABEL)
            .ok_or(CollectorError::MissingLabel {
                backend: "SQS",
                label: REGION_LABEL,
            })?;
        let client = self
            .clients
            .get(region)
            .cloned()
            .ok_or_else(|| CollectorError::UnknownRegion(region.clone()))?;
        Ok(Box::new(SqsCollector::new(client, config, interval)?))
    }
}

impl CollectorPlugin for AwsPlugin {
    fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        dispatch(self, Self::METRICS, hpa, config, interval)
    }
}

/// Reports the approximate number of messages waiting in one queue.
pub struct SqsCollector {
    client: Arc<dyn QueueClient>,
    queue_name: String,
    metric_name: String,
    labels: Labels,
    interval: Duration,
}

impl SqsCollector {
    pub fn new(
        client: Arc<dyn QueueClient>,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Self> {
        let queue_name = config
            .labels
            .get(QUEUE_NAME_LABEL)
            .cloned()
            .ok_or(CollectorError::MissingLabel {
                backend: "SQS",
                label: QUEUE_NAME_LABEL,
            })?;

        Ok(Self {
            client,
            queue_name,
            metric_name: config.name.clone(),
            labels: config.labels.clone(),
            interval,
        })
    }
}

#[async_trait]
impl Collector for SqsCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        let attributes = self
            .client
            .get_queue_attributes(&self.queue_name, &[LENGTH_ATTRIBUTE])
            .await?;
        let raw = attributes
            .get(LENGTH_ATTRIBUTE)
            .ok_or_else(|| CollectorError::MissingAttribute(self.queue_name.clone()))?;
        let length: i64 = raw
            .trim()
            .parse()
            .map_err(|_| CollectorError::InvalidNumber(raw.clone()))?;
        debug!(queue = %self.queue_name, length, "queue length");

        Ok(vec![CollectedMetric::External(ExternalMetricValue {
            metric_name: self.metric_name.clone(),
            metric_labels: self.labels.clone(),
            timestamp: Utc::now(),
            value: Quantity::from_int(length),
        })])
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}
