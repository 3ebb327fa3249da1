//! Maximum-of combinator.

use std::time::Duration;

use async_trait::async_trait;

use adapter_core::CollectedMetric;

use crate::collector::Collector;
use crate::error::{CollectorError, CollectorResult};

/// Runs every delegate and keeps the single largest value.
///
/// Delegates run in order; the first error aborts the cycle. On ties the
/// earliest value wins.
pub struct MaxCollector {
    collectors: Vec<Box<dyn Collector>>,
    interval: Duration,
}

impl MaxCollector {
    pub fn new(interval: Duration, collectors: Vec<Box<dyn Collector>>) -> Self {
        Self {
            collectors,
            interval,
        }
    }
}

#[async_trait]
impl Collector for MaxCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        if self.collectors.is_empty() {
            return Err(CollectorError::NoDelegates);
        }

        let mut max: Option<CollectedMetric> = None;
        for collector in &self.collectors {
            for value in collector.get_metrics().await? {
                if max.as_ref().is_none_or(|m| value.quantity() > m.quantity()) {
                    max = Some(value);
                }
            }
        }

        max.map(|m| vec![m]).ok_or(CollectorError::NoValues)
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}
