//! MetricStore: in-memory store of the latest collected metric values.
//!
//! Values are written by collection workers and read by the API-serving
//! layer. Each entry carries an expiry deadline; `remove_expired` drops
//! stale entries. Keys are flat and ordered, so removing an entry never
//! leaves an empty branch behind and scans over a metric name are range
//! scans.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use adapter_core::{
    canonical_labels, AdapterConfig, CollectedMetric, CustomMetricValue, ExternalMetricValue,
    GroupResource, Labels, Selector,
};

use crate::error::{StoreError, StoreResult};
use crate::kinds::KindMap;

/// A stored value plus the deadline after which it is considered stale.
#[derive(Debug, Clone)]
pub struct StoredMetric<V> {
    pub value: V,
    pub labels: Labels,
    pub expires_at: Instant,
}

/// Identity of a custom metric value.
///
/// Field order defines the scan order: name, group-resource, namespace,
/// object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CustomKey {
    pub metric_name: String,
    pub group_resource: GroupResource,
    pub namespace: String,
    pub object_name: String,
}

/// Identity of an external metric value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExternalKey {
    pub metric_name: String,
    /// Canonical form of the label set (see [`canonical_labels`]).
    pub labels_key: String,
}

/// A custom metric known to the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CustomMetricInfo {
    pub group_resource: GroupResource,
    pub namespaced: bool,
    pub metric: String,
}

/// An external metric known to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMetricInfo {
    pub metric: String,
    pub labels: Labels,
}

#[derive(Default)]
struct Metrics {
    custom: BTreeMap<CustomKey, StoredMetric<CustomMetricValue>>,
    external: BTreeMap<ExternalKey, StoredMetric<ExternalMetricValue>>,
}

impl Metrics {
    /// All custom entries for one metric name and group-resource.
    fn custom_group<'a>(
        &'a self,
        metric_name: &'a str,
        group_resource: &'a GroupResource,
    ) -> impl Iterator<Item = (&'a CustomKey, &'a StoredMetric<CustomMetricValue>)> + 'a {
        let start = CustomKey {
            metric_name: metric_name.to_string(),
            group_resource: group_resource.clone(),
            namespace: String::new(),
            object_name: String::new(),
        };
        self.custom.range(start..).take_while(move |(k, _)| {
            k.metric_name == metric_name && &k.group_resource == group_resource
        })
    }

    /// All custom entries for one metric name and group-resource in one
    /// namespace.
    fn custom_namespace<'a>(
        &'a self,
        metric_name: &'a str,
        group_resource: &'a GroupResource,
        namespace: &'a str,
    ) -> impl Iterator<Item = (&'a CustomKey, &'a StoredMetric<CustomMetricValue>)> + 'a {
        let start = CustomKey {
            metric_name: metric_name.to_string(),
            group_resource: group_resource.clone(),
            namespace: namespace.to_string(),
            object_name: String::new(),
        };
        self.custom.range(start..).take_while(move |(k, _)| {
            k.metric_name == metric_name
                && &k.group_resource == group_resource
                && k.namespace == namespace
        })
    }
}

/// Thread-safe metric store.
///
/// Cloning is cheap and every clone shares the same entries. Reads take
/// the shared lock, inserts and sweeps take the exclusive lock.
#[derive(Clone)]
pub struct MetricStore {
    metrics: Arc<RwLock<Metrics>>,
    kinds: Arc<KindMap>,
    ttl: Duration,
}

impl MetricStore {
    /// Create an empty store with the default kind mapping.
    pub fn new(ttl: Duration) -> Self {
        Self::with_kinds(ttl, KindMap::default())
    }

    pub fn with_kinds(ttl: Duration, kinds: KindMap) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::default())),
            kinds: Arc::new(kinds),
            ttl,
        }
    }

    /// Build a store from the `[store]` and `[kinds]` config sections.
    pub fn from_config(config: &AdapterConfig) -> StoreResult<Self> {
        let mut kinds = KindMap::default();
        kinds.extend(&config.kinds);
        Ok(Self::with_kinds(config.ttl()?, kinds))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a collected metric, replacing any value with the same
    /// identity and resetting its expiry.
    pub async fn insert(&self, metric: CollectedMetric) -> StoreResult<()> {
        match metric {
            CollectedMetric::Object { value, labels } | CollectedMetric::Pods { value, labels } => {
                self.insert_custom_metric(value, labels).await
            }
            CollectedMetric::External(value) => {
                self.insert_external_metric(value).await;
                Ok(())
            }
        }
    }

    async fn insert_custom_metric(&self, value: CustomMetricValue, labels: Labels) -> StoreResult<()> {
        let Some(group_resource) = self.kinds.resolve(&value.described_object.kind) else {
            warn!(
                kind = %value.described_object.kind,
                metric = %value.metric_name,
                "rejecting custom metric for unmapped kind"
            );
            return Err(StoreError::UnmappedKind {
                kind: value.described_object.kind,
                metric: value.metric_name,
            });
        };

        let key = CustomKey {
            metric_name: value.metric_name.clone(),
            group_resource: group_resource.clone(),
            namespace: value.described_object.namespace.clone(),
            object_name: value.described_object.name.clone(),
        };
        let stored = StoredMetric {
            value,
            labels,
            expires_at: Instant::now() + self.ttl,
        };

        let mut metrics = self.metrics.write().await;
        metrics.custom.insert(key.clone(), stored);
        debug!(
            metric = %key.metric_name,
            group_resource = %key.group_resource,
            namespace = %key.namespace,
            object = %key.object_name,
            "custom metric stored"
        );
        Ok(())
    }

    async fn insert_external_metric(&self, value: ExternalMetricValue) {
        let key = ExternalKey {
            metric_name: value.metric_name.clone(),
            labels_key: canonical_labels(&value.metric_labels),
        };
        let stored = StoredMetric {
            labels: value.metric_labels.clone(),
            value,
            expires_at: Instant::now() + self.ttl,
        };

        let mut metrics = self.metrics.write().await;
        metrics.external.insert(key.clone(), stored);
        debug!(metric = %key.metric_name, labels = %key.labels_key, "external metric stored");
    }

    /// Custom metric values whose labels match `selector`.
    ///
    /// An empty `namespace` searches every namespace. Unknown metrics
    /// yield an empty list.
    pub async fn get_metrics_by_selector(
        &self,
        metric_name: &str,
        group_resource: &GroupResource,
        namespace: &str,
        selector: &Selector,
    ) -> Vec<CustomMetricValue> {
        let metrics = self.metrics.read().await;
        let matches = |(_, m): &(&CustomKey, &StoredMetric<CustomMetricValue>)| {
            selector.matches(&m.labels)
        };

        if namespace.is_empty() {
            metrics
                .custom_group(metric_name, group_resource)
                .filter(matches)
                .map(|(_, m)| m.value.clone())
                .collect()
        } else {
            metrics
                .custom_namespace(metric_name, group_resource, namespace)
                .filter(matches)
                .map(|(_, m)| m.value.clone())
                .collect()
        }
    }

    /// Exact lookup of one object's value.
    ///
    /// With an empty `namespace` the first namespace (in lexical order)
    /// holding an object called `name` wins.
    pub async fn get_metrics_by_name(
        &self,
        metric_name: &str,
        group_resource: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Option<CustomMetricValue> {
        let metrics = self.metrics.read().await;

        if namespace.is_empty() {
            metrics
                .custom_group(metric_name, group_resource)
                .find(|(k, _)| k.object_name == name)
                .map(|(_, m)| m.value.clone())
        } else {
            let key = CustomKey {
                metric_name: metric_name.to_string(),
                group_resource: group_resource.clone(),
                namespace: namespace.to_string(),
                object_name: name.to_string(),
            };
            metrics.custom.get(&key).map(|m| m.value.clone())
        }
    }

    /// Every custom metric identity currently held, including expired
    /// entries not yet swept.
    pub async fn list_all_metrics(&self) -> Vec<CustomMetricInfo> {
        let metrics = self.metrics.read().await;
        let infos: BTreeSet<CustomMetricInfo> = metrics
            .custom
            .keys()
            .map(|k| CustomMetricInfo {
                group_resource: k.group_resource.clone(),
                namespaced: !k.namespace.is_empty(),
                metric: k.metric_name.clone(),
            })
            .collect();
        infos.into_iter().collect()
    }

    /// External values for `metric_name` whose labels match `selector`.
    ///
    /// External metrics are not namespaced; `namespace` is accepted for
    /// symmetry with the API and ignored.
    pub async fn get_external_metric(
        &self,
        _namespace: &str,
        metric_name: &str,
        selector: &Selector,
    ) -> Vec<ExternalMetricValue> {
        let metrics = self.metrics.read().await;
        let start = ExternalKey {
            metric_name: metric_name.to_string(),
            labels_key: String::new(),
        };
        metrics
            .external
            .range(start..)
            .take_while(|(k, _)| k.metric_name == metric_name)
            .filter(|(_, m)| selector.matches(&m.labels))
            .map(|(_, m)| m.value.clone())
            .collect()
    }

    pub async fn list_all_external_metrics(&self) -> Vec<ExternalMetricInfo> {
        let metrics = self.metrics.read().await;
        metrics
            .external
            .iter()
            .map(|(k, m)| ExternalMetricInfo {
                metric: k.metric_name.clone(),
                labels: m.labels.clone(),
            })
            .collect()
    }

    /// Drop every entry whose deadline has passed. Returns how many
    /// entries were removed.
    pub async fn remove_expired(&self) -> usize {
        let mut metrics = self.metrics.write().await;
        let now = Instant::now();
        let before = metrics.custom.len() + metrics.external.len();

        metrics.custom.retain(|_, m| m.expires_at >= now);
        metrics.external.retain(|_, m| m.expires_at >= now);

        let removed = before - (metrics.custom.len() + metrics.external.len());
        if removed > 0 {
            debug!(removed, "expired metrics removed");
        }
        removed
    }

    /// Total number of stored values (custom and external).
    pub async fn len(&self) -> usize {
        let metrics = self.metrics.read().await;
        metrics.custom.len() + metrics.external.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_core::{ObjectReference, Quantity};
    use chrono::Utc;

    const TTL: Duration = Duration::from_secs(15 * 60);

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn custom(kind: &str, ns: &str, name: &str, metric: &str, q: i64, l: Labels) -> CollectedMetric {
        CollectedMetric::Object {
            value: CustomMetricValue {
                described_object: ObjectReference {
                    kind: kind.to_string(),
                    namespace: ns.to_string(),
                    name: name.to_string(),
                    api_version: "v1".to_string(),
                },
                metric_name: metric.to_string(),
                timestamp: Utc::now(),
                value: Quantity::from_int(q),
            },
            labels: l,
        }
    }

    fn pod(ns: &str, name: &str, q: i64, l: Labels) -> CollectedMetric {
        custom("Pod", ns, name, "requests-per-second", q, l)
    }

    fn external(metric: &str, l: Labels, q: i64) -> CollectedMetric {
        CollectedMetric::External(ExternalMetricValue {
            metric_name: metric.to_string(),
            metric_labels: l,
            timestamp: Utc::now(),
            value: Quantity::from_int(q),
        })
    }

    fn pods() -> GroupResource {
        GroupResource::core("pods")
    }

    #[tokio::test]
    async fn insert_then_get_by_name() {
        let store = MetricStore::new(TTL);
        store
            .insert(pod("ns1", "pod-a", 42, labels(&[("app", "x")])))
            .await
            .unwrap();

        let value = store
            .get_metrics_by_name("requests-per-second", &pods(), "ns1", "pod-a")
            .await
            .unwrap();
        assert_eq!(value.value, Quantity::from_int(42));
        assert_eq!(value.described_object.name, "pod-a");

        assert!(store
            .get_metrics_by_name("requests-per-second", &pods(), "ns2", "pod-a")
            .await
            .is_none());
        assert!(store
            .get_metrics_by_name("unknown", &pods(), "ns1", "pod-a")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn reinsert_overwrites_same_identity() {
        let store = MetricStore::new(TTL);
        store.insert(pod("ns1", "pod-a", 1, Labels::new())).await.unwrap();
        store.insert(pod("ns1", "pod-a", 2, Labels::new())).await.unwrap();

        assert_eq!(store.len().await, 1);
        let value = store
            .get_metrics_by_name("requests-per-second", &pods(), "ns1", "pod-a")
            .await
            .unwrap();
        assert_eq!(value.value, Quantity::from_int(2));
    }

    #[tokio::test]
    async fn ingress_metrics_use_extensions_group() {
        let store = MetricStore::new(TTL);
        store
            .insert(custom("Ingress", "ns1", "web", "requests-per-second", 10, Labels::new()))
            .await
            .unwrap();

        let ingresses = GroupResource::new("extensions", "ingresses");
        assert!(store
            .get_metrics_by_name("requests-per-second", &ingresses, "ns1", "web")
            .await
            .is_some());
        assert!(store
            .get_metrics_by_name("requests-per-second", &pods(), "ns1", "web")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn unmapped_kind_is_rejected() {
        let store = MetricStore::new(TTL);
        let err = store
            .insert(custom("RouteGroup", "ns1", "rg", "requests-per-second", 1, Labels::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnmappedKind { ref kind, .. } if kind == "RouteGroup"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn configured_kind_is_accepted() {
        let config = AdapterConfig::from_toml_str(
            "[kinds]\nRouteGroup = { group = \"zalando.org\", resource = \"routegroups\" }\n",
        )
        .unwrap();
        let store = MetricStore::from_config(&config).unwrap();
        store
            .insert(custom("RouteGroup", "ns1", "rg", "requests-per-second", 1, Labels::new()))
            .await
            .unwrap();

        let infos = store.list_all_metrics().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(
            infos[0].group_resource,
            GroupResource::new("zalando.org", "routegroups")
        );
    }

    #[tokio::test]
    async fn selector_scans_one_or_all_namespaces() {
        let store = MetricStore::new(TTL);
        store.insert(pod("ns1", "a", 1, labels(&[("app", "x")]))).await.unwrap();
        store.insert(pod("ns1", "b", 2, labels(&[("app", "y")]))).await.unwrap();
        store.insert(pod("ns2", "c", 3, labels(&[("app", "x")]))).await.unwrap();

        let sel: Selector = "app=x".parse().unwrap();

        let all = store
            .get_metrics_by_selector("requests-per-second", &pods(), "", &sel)
            .await;
        let mut names: Vec<_> = all.iter().map(|v| v.described_object.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "c"]);

        let ns1 = store
            .get_metrics_by_selector("requests-per-second", &pods(), "ns1", &sel)
            .await;
        assert_eq!(ns1.len(), 1);
        assert_eq!(ns1[0].described_object.name, "a");

        let everything = store
            .get_metrics_by_selector("requests-per-second", &pods(), "ns1", &Selector::everything())
            .await;
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn selector_on_unknown_metric_is_empty() {
        let store = MetricStore::new(TTL);
        store.insert(pod("ns1", "a", 1, labels(&[("app", "x")]))).await.unwrap();

        let sel = Selector::everything();
        assert!(store
            .get_metrics_by_selector("other", &pods(), "", &sel)
            .await
            .is_empty());
        assert!(store
            .get_metrics_by_selector(
                "requests-per-second",
                &GroupResource::new("extensions", "ingresses"),
                "",
                &sel
            )
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn empty_labels_only_match_empty_selector() {
        let store = MetricStore::new(TTL);
        store.insert(pod("ns1", "a", 1, Labels::new())).await.unwrap();

        let sel: Selector = "app=x".parse().unwrap();
        assert!(store
            .get_metrics_by_selector("requests-per-second", &pods(), "ns1", &sel)
            .await
            .is_empty());
        assert_eq!(
            store
                .get_metrics_by_selector("requests-per-second", &pods(), "ns1", &Selector::everything())
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn get_by_name_without_namespace_picks_first_namespace() {
        let store = MetricStore::new(TTL);
        store.insert(pod("zeta", "shared", 2, Labels::new())).await.unwrap();
        store.insert(pod("alpha", "shared", 1, Labels::new())).await.unwrap();

        let value = store
            .get_metrics_by_name("requests-per-second", &pods(), "", "shared")
            .await
            .unwrap();
        assert_eq!(value.described_object.namespace, "alpha");
    }

    #[tokio::test]
    async fn list_all_metrics_deduplicates_identities() {
        let store = MetricStore::new(TTL);
        store.insert(pod("ns1", "a", 1, Labels::new())).await.unwrap();
        store.insert(pod("ns2", "b", 1, Labels::new())).await.unwrap();
        store
            .insert(custom("Pod", "", "node-level", "queue-depth", 1, Labels::new()))
            .await
            .unwrap();

        let infos = store.list_all_metrics().await;
        assert_eq!(infos.len(), 2);
        let rps = infos.iter().find(|i| i.metric == "requests-per-second").unwrap();
        assert!(rps.namespaced);
        let depth = infos.iter().find(|i| i.metric == "queue-depth").unwrap();
        assert!(!depth.namespaced);
    }

    #[tokio::test]
    async fn external_labels_are_order_independent() {
        let store = MetricStore::new(TTL);

        let mut first = Labels::new();
        first.insert("b".into(), "2".into());
        first.insert("a".into(), "1".into());
        store.insert(external("sqs-queue-length", first, 5)).await.unwrap();
        store
            .insert(external("sqs-queue-length", labels(&[("a", "1"), ("b", "2")]), 9))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let values = store
            .get_external_metric("default", "sqs-queue-length", &Selector::everything())
            .await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, Quantity::from_int(9));
    }

    #[tokio::test]
    async fn external_metric_selector_filters_values() {
        let store = MetricStore::new(TTL);
        store
            .insert(external("sqs-queue-length", labels(&[("queue-name", "a")]), 1))
            .await
            .unwrap();
        store
            .insert(external("sqs-queue-length", labels(&[("queue-name", "b")]), 2))
            .await
            .unwrap();
        store
            .insert(external("zmon-check", labels(&[("queue-name", "a")]), 3))
            .await
            .unwrap();

        let sel: Selector = "queue-name=a".parse().unwrap();
        let values = store.get_external_metric("", "sqs-queue-length", &sel).await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, Quantity::from_int(1));

        assert_eq!(store.list_all_external_metrics().await.len(), 3);
        assert!(store
            .get_external_metric("", "missing", &Selector::everything())
            .await
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_expired_drops_stale_entries() {
        let store = MetricStore::new(Duration::from_secs(60));
        store.insert(pod("ns1", "old", 1, Labels::new())).await.unwrap();
        store
            .insert(external("zmon-check", labels(&[("check-id", "1")]), 1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        store.insert(pod("ns1", "fresh", 2, Labels::new())).await.unwrap();
        assert_eq!(store.remove_expired().await, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.remove_expired().await, 2);

        assert!(store
            .get_metrics_by_name("requests-per-second", &pods(), "ns1", "old")
            .await
            .is_none());
        assert!(store
            .get_metrics_by_name("requests-per-second", &pods(), "ns1", "fresh")
            .await
            .is_some());
        assert!(store.list_all_external_metrics().await.is_empty());
        assert_eq!(store.list_all_metrics().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_resets_expiry() {
        let store = MetricStore::new(Duration::from_secs(60));
        store.insert(pod("ns1", "a", 1, Labels::new())).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        store.insert(pod("ns1", "a", 2, Labels::new())).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.remove_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_stay_listed_until_swept() {
        let store = MetricStore::new(Duration::from_secs(1));
        store.insert(pod("ns1", "a", 1, Labels::new())).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.list_all_metrics().await.len(), 1);

        store.remove_expired().await;
        assert!(store.list_all_metrics().await.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_inserts_to_distinct_identities() {
        let store = MetricStore::new(TTL);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(pod("ns1", &format!("pod-{i}"), i, Labels::new()))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 16);
    }
}
