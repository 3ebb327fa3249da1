//! Metrics provider: one background worker per metric binding.
//!
//! Each worker owns a collector, invokes it every `interval()` and writes
//! whatever it returns into the shared [`MetricStore`]. A failed cycle is
//! logged and retried on the next tick. Stopping a worker discards any
//! result still in flight.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use adapter_collector::{Collector, CollectorFactory};
use adapter_core::config::non_zero;
use adapter_core::{AdapterConfig, AutoscalerRef, MetricConfig};
use adapter_store::MetricStore;

use crate::error::{ProviderError, ProviderResult};

/// One metric of one autoscaler, as discovered from cluster state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricBinding {
    pub id: String,
    pub autoscaler: AutoscalerRef,
    pub config: MetricConfig,
}

impl MetricBinding {
    /// Bind `config` to `autoscaler` under the id
    /// `namespace/name/metric`.
    pub fn new(autoscaler: AutoscalerRef, config: MetricConfig) -> Self {
        let id = format!("{autoscaler}/{}", config.name);
        Self {
            id,
            autoscaler,
            config,
        }
    }
}

/// Outcome of a [`MetricsProvider::reconcile`] pass.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    /// Bindings whose collector could not be built. Their workers are not
    /// running after the pass.
    pub failed: Vec<ProviderError>,
}

impl ReconcileSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} started, {} restarted, {} stopped, {} failed",
            self.started.len(),
            self.restarted.len(),
            self.stopped.len(),
            self.failed.len()
        )
    }
}

struct CollectorSlot {
    binding: MetricBinding,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl CollectorSlot {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

/// Runs collection workers and owns the store they feed.
pub struct MetricsProvider {
    store: MetricStore,
    factory: Arc<CollectorFactory>,
    default_interval: Duration,
    /// Active workers: binding id → slot.
    collectors: Arc<RwLock<HashMap<String, CollectorSlot>>>,
}

impl MetricsProvider {
    pub fn new(store: MetricStore, factory: Arc<CollectorFactory>, default_interval: Duration) -> Self {
        Self {
            store,
            factory,
            default_interval,
            collectors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build the store and collection defaults from `config`.
    pub fn from_config(config: &AdapterConfig, factory: Arc<CollectorFactory>) -> ProviderResult<Self> {
        config.validate()?;
        let store = MetricStore::from_config(config)?;
        Ok(Self::new(store, factory, config.default_interval()?))
    }

    /// Handle to the store, for the API-serving side.
    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// A collector whose period is zero is rejected here; `interval` would
    /// panic inside the worker.
    fn build(&self, binding: &MetricBinding) -> ProviderResult<Box<dyn Collector>> {
        let interval = binding.config.interval.unwrap_or(self.default_interval);
        let collector = self
            .factory
            .new_collector(&binding.autoscaler, &binding.config, interval)
            .and_then(|collector| {
                non_zero("interval", collector.interval())?;
                Ok(collector)
            })
            .map_err(|source| ProviderError::Collector {
                id: binding.id.clone(),
                source,
            })?;
        Ok(collector)
    }

    /// Start collecting for `binding`, replacing any worker with the same
    /// id. A configuration error is returned and nothing is scheduled.
    pub async fn start_collector(&self, binding: MetricBinding) -> ProviderResult<()> {
        let collector = self.build(&binding)?;
        self.spawn(binding, collector).await;
        Ok(())
    }

    async fn spawn(&self, binding: MetricBinding, collector: Box<dyn Collector>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let id = binding.id.clone();
        let interval = collector.interval();
        let store = self.store.clone();

        let worker_id = id.clone();
        let handle = tokio::spawn(async move {
            run_collector_loop(&worker_id, collector, store, shutdown_rx).await;
        });

        let mut collectors = self.collectors.write().await;
        if let Some(old) = collectors.insert(
            id.clone(),
            CollectorSlot {
                binding,
                handle,
                shutdown_tx,
            },
        ) {
            old.stop();
        }

        info!(%id, interval_secs = interval.as_secs_f64(), "collector started");
    }

    pub async fn stop_collector(&self, id: &str) {
        let mut collectors = self.collectors.write().await;
        if let Some(slot) = collectors.remove(id) {
            slot.stop();
            info!(%id, "collector stopped");
        }
    }

    /// Stop every worker (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut collectors = self.collectors.write().await;
        for (id, slot) in collectors.drain() {
            slot.stop();
            debug!(%id, "collector stopped");
        }
        info!("all collectors stopped");
    }

    /// Binding ids with a running worker, sorted.
    pub async fn active_collectors(&self) -> Vec<String> {
        let collectors = self.collectors.read().await;
        let mut ids: Vec<String> = collectors.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_collecting(&self, id: &str) -> bool {
        let collectors = self.collectors.read().await;
        collectors.contains_key(id)
    }

    /// Make the running workers match `bindings`.
    ///
    /// New bindings are started, bindings whose autoscaler or metric
    /// configuration changed are restarted, and workers without a binding
    /// are stopped. A binding that fails to build is reported and does
    /// not stop the pass; a stale worker for it is stopped.
    pub async fn reconcile(&self, bindings: Vec<MetricBinding>) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let desired: HashSet<String> = bindings.iter().map(|b| b.id.clone()).collect();

        let current: HashMap<String, MetricBinding> = {
            let collectors = self.collectors.read().await;
            collectors
                .iter()
                .map(|(id, slot)| (id.clone(), slot.binding.clone()))
                .collect()
        };

        for id in current.keys().filter(|id| !desired.contains(*id)) {
            self.stop_collector(id).await;
            summary.stopped.push(id.clone());
        }

        for binding in bindings {
            let existing = current.get(&binding.id);
            if existing == Some(&binding) {
                continue;
            }

            let id = binding.id.clone();
            match self.build(&binding) {
                Ok(collector) => {
                    self.spawn(binding, collector).await;
                    if existing.is_some() {
                        summary.restarted.push(id);
                    } else {
                        summary.started.push(id);
                    }
                }
                Err(e) => {
                    warn!(%id, error = %e, "collector not started");
                    if existing.is_some() {
                        self.stop_collector(&id).await;
                    }
                    summary.failed.push(e);
                }
            }
        }

        info!(%summary, "collectors reconciled");
        summary
    }

    /// Sweep expired entries out of the store every `interval` until
    /// shutdown. A zero interval is refused and nothing is swept.
    pub async fn run_housekeeping(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        if interval.is_zero() {
            error!("store housekeeping not started: interval must be greater than zero");
            return;
        }
        info!(interval_secs = interval.as_secs_f64(), "store housekeeping started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.store.remove_expired().await;
                    if removed > 0 {
                        debug!(removed, "expired metrics removed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("store housekeeping shutting down");
                    break;
                }
            }
        }
    }
}

/// Collection loop for a single binding. Collects once right away, then
/// on every tick.
async fn run_collector_loop(
    id: &str,
    collector: Box<dyn Collector>,
    store: MetricStore,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(collector.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(%id, "collector loop starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let result = tokio::select! {
            result = collector.get_metrics() => result,
            _ = shutdown.changed() => {
                debug!(%id, "discarding in-flight collection");
                break;
            }
        };

        match result {
            Ok(values) => {
                let count = values.len();
                for value in values {
                    if let Err(e) = store.insert(value).await {
                        warn!(%id, error = %e, "collected metric not stored");
                    }
                }
                debug!(%id, count, "metrics collected");
            }
            Err(e) => {
                warn!(%id, error = %e, "failed to collect metrics");
            }
        }
    }

    debug!(%id, "collector loop shutting down");
}
