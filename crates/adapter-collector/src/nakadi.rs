//! Event-stream subscription collectors.
//!
//! Both metrics read the same subscription statistics and narrow them to
//! one event type: unconsumed events are summed over its partitions, and
//! consumer lag is the worst partition's lag.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use adapter_core::{
    AutoscalerRef, CollectedMetric, ExternalMetricValue, Labels, MetricConfig, Quantity,
};

use crate::backend::{EventTypeStats, SubscriptionClient};
use crate::collector::{dispatch, Collector, CollectorPlugin, MetricTable};
use crate::error::{CollectorError, CollectorResult};

pub const NAKADI_UNCONSUMED_EVENTS_METRIC: &str = "nakadi-unconsumed-events";
pub const NAKADI_CONSUMER_LAG_SECONDS_METRIC: &str = "nakadi-consumer-lag-seconds";

const SUBSCRIPTION_ID_LABEL: &str = "subscription-id";
const EVENT_TYPE_LABEL: &str = "event-type";

/// Which figure of the subscription statistics a collector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStat {
    UnconsumedEvents,
    ConsumerLagSeconds,
}

impl SubscriptionStat {
    fn of(self, stats: &EventTypeStats) -> i64 {
        let partitions = stats.partitions.iter();
        match self {
            SubscriptionStat::UnconsumedEvents => {
                partitions.map(|p| p.unconsumed_events).sum()
            }
            SubscriptionStat::ConsumerLagSeconds => partitions
                .map(|p| p.consumer_lag_seconds)
                .max()
                .unwrap_or(0),
        }
    }
}

/// Builds subscription collectors bound to a shared stats client.
#[derive(Clone)]
pub struct NakadiPlugin {
    client: Arc<dyn SubscriptionClient>,
}

impl NakadiPlugin {
    pub const METRICS: MetricTable<Self> = &[
        (NAKADI_UNCONSUMED_EVENTS_METRIC, Self::unconsumed_events_collector),
        (NAKADI_CONSUMER_LAG_SECONDS_METRIC, Self::consumer_lag_collector),
    ];

    pub fn new(client: Arc<dyn SubscriptionClient>) -> Self {
        Self { client }
    }

    fn unconsumed_events_collector(
        &self,
        _hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        Ok(Box::new(NakadiCollector::new(
            self.client.clone(),
            SubscriptionStat::UnconsumedEvents,
            config,
            interval,
        )?))
    }

    fn consumer_lag_collector(
        &self,
        _hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        Ok(Box::new(NakadiCollector::new(
            self.client.clone(),
            SubscriptionStat::ConsumerLagSeconds,
            config,
            interval,
        )?))
    }
}

impl CollectorPlugin for NakadiPlugin {
    fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        dispatch(self, Self::METRICS, hpa, config, interval)
    }
}

pub struct NakadiCollector {
    client: Arc<dyn SubscriptionClient>,
    stat: SubscriptionStat,
    subscription_id: String,
    event_type: String,
    metric_name: String,
    labels: Labels,
    interval: Duration,
}

impl NakadiCollector {
    pub fn new(
        client: Arc<dyn SubscriptionClient>,
        stat: SubscriptionStat,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Self> {
        let label = |label: &'static str| {
            config
                .labels
                .get(label)
                .cloned()
                .ok_or(CollectorError::MissingLabel {
                    backend: "Nakadi",
                    label,
                })
        };
        let subscription_id = label(SUBSCRIPTION_ID_LABEL)?;
        let event_type = label(EVENT_TYPE_LABEL)?;

        Ok(Self {
            client,
            stat,
            subscription_id,
            event_type,
            metric_name: config.name.clone(),
            labels: config.labels.clone(),
            interval,
        })
    }

    pub fn stat(&self) -> SubscriptionStat {
        self.stat
    }
}

#[async_trait]
impl Collector for NakadiCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        let stats = self.client.stats(&self.subscription_id).await?;
        let event_type = stats
            .iter()
            .find(|s| s.event_type == self.event_type)
            .ok_or_else(|| CollectorError::UnknownEventType {
                subscription: self.subscription_id.clone(),
                event_type: self.event_type.clone(),
            })?;
        let value = self.stat.of(event_type);
        debug!(
            subscription = %self.subscription_id,
            event_type = %self.event_type,
            stat = ?self.stat,
            value,
            "subscription stats"
        );

        Ok(vec![CollectedMetric::External(ExternalMetricValue {
            metric_name: self.metric_name.clone(),
            metric_labels: self.labels.clone(),
            timestamp: Utc::now(),
            value: Quantity::from_int(value),
        })])
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}
