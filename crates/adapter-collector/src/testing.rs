//! In-crate fakes for collector tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use adapter_core::{
    AutoscalerRef, CollectedMetric, CrossVersionObjectReference, CustomMetricValue,
    ExternalMetricValue, Labels, ObjectReference, Quantity,
};

use crate::backend::{
    CheckClient, EventTypeStats, PartitionStats, QueryClient, QueueClient, SubscriptionClient,
};
use crate::cluster::{ClusterClient, Ingress, IngressRule, WorkloadStatus};
use crate::collector::Collector;
use crate::error::{CollectorError, CollectorResult};

pub fn deployment_hpa(target: &str) -> AutoscalerRef {
    AutoscalerRef {
        namespace: "default".into(),
        name: format!("{target}-hpa"),
        scale_target: CrossVersionObjectReference {
            kind: "Deployment".into(),
            name: target.into(),
            api_version: "apps/v1".into(),
        },
    }
}

pub fn ingress_ref(name: &str) -> ObjectReference {
    ObjectReference {
        kind: "Ingress".into(),
        namespace: "default".into(),
        name: name.into(),
        api_version: "extensions/v1beta1".into(),
    }
}

pub fn external_value(name: &str, q: Quantity) -> CollectedMetric {
    CollectedMetric::External(ExternalMetricValue {
        metric_name: name.into(),
        metric_labels: Labels::new(),
        timestamp: Utc::now(),
        value: q,
    })
}

pub fn object_value(name: &str, q: Quantity) -> CollectedMetric {
    CollectedMetric::Object {
        value: CustomMetricValue {
            described_object: ingress_ref("web"),
            metric_name: name.into(),
            timestamp: Utc::now(),
            value: q,
        },
        labels: Labels::new(),
    }
}

/// Returns a fixed result on every call and counts calls.
pub struct FixedCollector {
    result: Result<Vec<CollectedMetric>, String>,
    pub calls: AtomicUsize,
}

impl FixedCollector {
    pub fn values(values: Vec<CollectedMetric>) -> Self {
        Self {
            result: Ok(values),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn quantity(q: i64) -> Self {
        Self::values(vec![external_value("m", Quantity::from_int(q))])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Collector for FixedCollector {
    async fn get_metrics(&self) -> CollectorResult<Vec<CollectedMetric>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(CollectorError::Backend)
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// Cluster objects held in memory.
#[derive(Default)]
pub struct FakeCluster {
    ingresses: HashMap<(String, String), Ingress>,
    deployments: HashMap<(String, String), i32>,
    stateful_sets: HashMap<(String, String), i32>,
}

impl FakeCluster {
    pub fn with_ingress(mut self, ns: &str, name: &str, hosts: &[&str]) -> Self {
        let rules = hosts
            .iter()
            .map(|h| IngressRule {
                host: h.to_string(),
            })
            .collect();
        self.ingresses
            .insert((ns.into(), name.into()), Ingress { rules });
        self
    }

    pub fn with_deployment(mut self, ns: &str, name: &str, ready: i32) -> Self {
        self.deployments.insert((ns.into(), name.into()), ready);
        self
    }

    pub fn with_stateful_set(mut self, ns: &str, name: &str, ready: i32) -> Self {
        self.stateful_sets.insert((ns.into(), name.into()), ready);
        self
    }
}

fn not_found(kind: &str, ns: &str, name: &str) -> CollectorError {
    CollectorError::Cluster(format!("{kind} {ns}/{name} not found"))
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_ingress(&self, namespace: &str, name: &str) -> CollectorResult<Ingress> {
        self.ingresses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("ingress", namespace, name))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> CollectorResult<WorkloadStatus> {
        self.deployments
            .get(&(namespace.to_string(), name.to_string()))
            .map(|&ready_replicas| WorkloadStatus { ready_replicas })
            .ok_or_else(|| not_found("deployment", namespace, name))
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> CollectorResult<WorkloadStatus> {
        self.stateful_sets
            .get(&(namespace.to_string(), name.to_string()))
            .map(|&ready_replicas| WorkloadStatus { ready_replicas })
            .ok_or_else(|| not_found("statefulset", namespace, name))
    }
}

/// Answers queries from a map and records every query it sees.
#[derive(Default)]
pub struct StaticQueryClient {
    answers: HashMap<String, f64>,
    pub seen: Mutex<Vec<String>>,
}

impl StaticQueryClient {
    pub fn with_answer(mut self, query: &str, value: f64) -> Self {
        self.answers.insert(query.into(), value);
        self
    }
}

#[async_trait]
impl QueryClient for StaticQueryClient {
    async fn query(&self, query: &str) -> CollectorResult<f64> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(query.to_string());
        }
        self.answers
            .get(query)
            .copied()
            .ok_or_else(|| CollectorError::Backend(format!("no answer for {query}")))
    }
}

/// Returns the same check value for every request.
pub struct StaticCheckClient(pub f64);

#[async_trait]
impl CheckClient for StaticCheckClient {
    async fn latest(&self, _check_id: &str, _key: &str, _window: Duration) -> CollectorResult<f64> {
        Ok(self.0)
    }
}

/// Queue attributes held in memory, per queue name.
#[derive(Default)]
pub struct FakeQueueClient {
    queues: HashMap<String, HashMap<String, String>>,
}

impl FakeQueueClient {
    pub fn with_attribute(mut self, queue: &str, name: &str, value: &str) -> Self {
        self.queues
            .entry(queue.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl QueueClient for FakeQueueClient {
    async fn get_queue_attributes(
        &self,
        queue_name: &str,
        attributes: &[&str],
    ) -> CollectorResult<HashMap<String, String>> {
        let queue = self
            .queues
            .get(queue_name)
            .ok_or_else(|| CollectorError::Backend(format!("queue {queue_name} does not exist")))?;
        Ok(queue
            .iter()
            .filter(|(k, _)| attributes.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Subscription statistics held in memory, per subscription id.
#[derive(Default)]
pub struct FakeSubscriptionClient {
    subscriptions: HashMap<String, Vec<EventTypeStats>>,
}

impl FakeSubscriptionClient {
    pub fn with_partition(
        mut self,
        subscription: &str,
        event_type: &str,
        partition: &str,
        unconsumed_events: i64,
        consumer_lag_seconds: i64,
    ) -> Self {
        let event_types = self.subscriptions.entry(subscription.to_string()).or_default();
        let index = match event_types.iter().position(|s| s.event_type == event_type) {
            Some(index) => index,
            None => {
                event_types.push(EventTypeStats {
                    event_type: event_type.to_string(),
                    partitions: Vec::new(),
                });
                event_types.len() - 1
            }
        };
        event_types[index].partitions.push(PartitionStats {
            partition: partition.to_string(),
            unconsumed_events,
            consumer_lag_seconds,
        });
        self
    }
}

#[async_trait]
impl SubscriptionClient for FakeSubscriptionClient {
    async fn stats(&self, subscription_id: &str) -> CollectorResult<Vec<EventTypeStats>> {
        self.subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                CollectorError::Backend(format!("subscription {subscription_id} does not exist"))
            })
    }
}
