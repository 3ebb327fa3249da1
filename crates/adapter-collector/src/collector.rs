//! The collector and collector-plugin contracts.

use std::time::Duration;

use async_trait::async_trait;

use adapter_core::{AutoscalerRef, CollectedMetric, MetricConfig};

use crate::error::{CollectorError, CollectorResult};

/// Performs one metric acquisition per call.
///
/// Collectors hold client handles but no collected data; every call to
/// `get_metrics` goes back to the backend.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Fetch the current value(s) of the metric.
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>>;

    /// How often the collector wants to be invoked. Fixed at construction.
    fn interval(&self) -> Duration;
}

/// Builds collectors for one backend kind.
///
/// Plugins validate the metric configuration and bind the client handles
/// they were created with. They never talk to a backend themselves.
pub trait CollectorPlugin: Send + Sync {
    fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>>;
}

/// Constructor for one supported metric name of plugin `P`.
pub type Constructor<P> =
    fn(&P, &AutoscalerRef, &MetricConfig, Duration) -> CollectorResult<Box<dyn Collector>>;

/// A plugin's supported metrics: metric name → constructor.
pub type MetricTable<P> = &'static [(&'static str, Constructor<P>)];

/// Look `config.name` up in `table` and run its constructor.
pub(crate) fn dispatch<P>(
    plugin: &P,
    table: MetricTable<P>,
    hpa: &AutoscalerRef,
    config: &MetricConfig,
    interval: Duration,
) -> CollectorResult<Box<dyn Collector>> {
    let (_, constructor) = table
        .iter()
        .find(|(name, _)| *name == config.name)
        .ok_or_else(|| CollectorError::UnsupportedMetric(config.name.clone()))?;
    constructor(plugin, hpa, config, interval)
}

/// Names listed in a plugin's metric table.
pub fn metric_names<P>(table: MetricTable<P>) -> Vec<&'static str> {
    table.iter().map(|(name, _)| *name).collect()
}
