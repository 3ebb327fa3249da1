//! Check-service collectors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use adapter_core::config::parse_duration;
use adapter_core::{
    AutoscalerRef, CollectedMetric, ExternalMetricValue, Labels, MetricConfig, Quantity,
};

use crate::backend::CheckClient;
use crate::collector::{dispatch, Collector, CollectorPlugin, MetricTable};
use crate::error::{CollectorError, CollectorResult};

pub const ZMON_CHECK_METRIC: &str = "zmon-check";

const CHECK_ID_LABEL: &str = "check-id";
const QUERY_LABEL: &str = "query";
const DURATION_LABEL: &str = "duration";
const DEFAULT_WINDOW: &str = "10m";

/// Builds check collectors bound to a shared check client.
#[derive(Clone)]
pub struct ZmonPlugin {
    client: Arc<dyn CheckClient>,
}

impl ZmonPlugin {
    pub const METRICS: MetricTable<Self> = &[(ZMON_CHECK_METRIC, Self::check_collector)];

    pub fn new(client: Arc<dyn CheckClient>) -> Self {
        Self { client }
    }

    fn check_collector(
        &self,
        _hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        Ok(Box::new(ZmonCollector::new(
            self.client.clone(),
            config,
            interval,
        )?))
    }
}

impl CollectorPlugin for ZmonPlugin {
    fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        dispatch(self, Self::METRICS, hpa, config, interval)
    }
}

/// Reports the latest datapoint of one check as an external metric.
pub struct ZmonCollector {
    client: Arc<dyn CheckClient>,
    check_id: String,
    query: String,
    window: Duration,
    metric_name: String,
    labels: Labels,
    interval: Duration,
}

impl ZmonCollector {
    pub fn new(
        client: Arc<dyn CheckClient>,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Self> {
        let label = |label: &'static str| {
            config
                .labels
                .get(label)
                .cloned()
                .ok_or(CollectorError::MissingLabel {
                    backend: "ZMON",
                    label,
                })
        };
        let check_id = label(CHECK_ID_LABEL)?;
        let query = label(QUERY_LABEL)?;
        let window = parse_duration(
            config
                .labels
                .get(DURATION_LABEL)
                .map(String::as_str)
                .unwrap_or(DEFAULT_WINDOW),
        )?;

        Ok(Self {
            client,
            check_id,
            query,
            window,
            metric_name: config.name.clone(),
            labels: config.labels.clone(),
            interval,
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[async_trait]
impl Collector for ZmonCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        let sample = self
            .client
            .latest(&self.check_id, &self.query, self.window)
            .await?;
        let value = Quantity::from_f64(sample)
            .ok_or_else(|| CollectorError::InvalidNumber(sample.to_string()))?;
        debug!(check_id = %self.check_id, key = %self.query, %value, "check datapoint");

        Ok(vec![CollectedMetric::External(ExternalMetricValue {
            metric_name: self.metric_name.clone(),
            metric_labels: self.labels.clone(),
            timestamp: Utc::now(),
            value,
        })])
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}
