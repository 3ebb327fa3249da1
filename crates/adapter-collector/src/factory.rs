//! Routes metric configurations to the plugin that builds their collector.
//!
//! Object plugins are registered per described kind and collector type,
//! pods plugins per collector type, external plugins per metric name. An
//! empty string registers a wildcard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use adapter_core::{AutoscalerRef, MetricConfig, MetricSourceType};

use crate::collector::{Collector, CollectorPlugin};
use crate::error::{CollectorError, CollectorResult};

#[derive(Default, Clone)]
pub struct CollectorFactory {
    object: HashMap<(String, String), Arc<dyn CollectorPlugin>>,
    pods: HashMap<String, Arc<dyn CollectorPlugin>>,
    external: HashMap<String, Arc<dyn CollectorPlugin>>,
}

impl CollectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_object_collector(
        &mut self,
        kind: &str,
        collector_type: &str,
        plugin: Arc<dyn CollectorPlugin>,
    ) {
        let key = (kind.to_string(), collector_type.to_string());
        if self.object.insert(key, plugin).is_some() {
            warn!(kind, collector_type, "object collector plugin replaced");
        }
    }

    pub fn register_pods_collector(&mut self, collector_type: &str, plugin: Arc<dyn CollectorPlugin>) {
        if self.pods.insert(collector_type.to_string(), plugin).is_some() {
            warn!(collector_type, "pods collector plugin replaced");
        }
    }

    /// Register `plugin` for every name in `metrics`.
    pub fn register_external_collector(&mut self, metrics: &[&str], plugin: Arc<dyn CollectorPlugin>) {
        for &metric in metrics {
            if self.external.insert(metric.to_string(), plugin.clone()).is_some() {
                warn!(metric, "external collector plugin replaced");
            }
        }
    }

    fn plugin_for(&self, config: &MetricConfig) -> Option<&Arc<dyn CollectorPlugin>> {
        match config.metric_type {
            MetricSourceType::Object => {
                let kind = config.object_reference.kind.as_str();
                let collector_type = config.collector_type.as_str();
                [(kind, collector_type), ("", collector_type), (kind, "")]
                    .into_iter()
                    .find_map(|(k, t)| self.object.get(&(k.to_string(), t.to_string())))
            }
            MetricSourceType::Pods => self
                .pods
                .get(&config.collector_type)
                .or_else(|| self.pods.get("")),
            MetricSourceType::External => self.external.get(&config.name),
        }
    }

    /// Build the collector for `config` bound to autoscaler `hpa`.
    pub fn new_collector(
        &self,
        hpa: &AutoscalerRef,
        config: &MetricConfig,
        interval: Duration,
    ) -> CollectorResult<Box<dyn Collector>> {
        let plugin = self.plugin_for(config).ok_or_else(|| CollectorError::NoPlugin {
            metric: config.name.clone(),
            source_type: format!("{:?}", config.metric_type),
        })?;
        debug!(hpa = %hpa, metric = %config.name, "building collector");
        plugin.new_collector(hpa, config, interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deployment_hpa, ingress_ref, FixedCollector};
    use adapter_core::CollectedMetric;
    use std::sync::Mutex;

    /// Records which plugin built a collector.
    struct Tagged {
        tag: &'static str,
        built: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CollectorPlugin for Tagged {
        fn new_collector(
            &self,
            _hpa: &AutoscalerRef,
            _config: &MetricConfig,
            _interval: Duration,
        ) -> CollectorResult<Box<dyn Collector>> {
            self.built.lock().unwrap().push(self.tag);
            Ok(Box::new(FixedCollector::values(Vec::<CollectedMetric>::new())))
        }
    }

    fn tagged(tag: &'static str, built: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn CollectorPlugin> {
        Arc::new(Tagged {
            tag,
            built: built.clone(),
        })
    }

    fn object_config(kind: &str, collector_type: &str) -> MetricConfig {
        let mut object = ingress_ref("web");
        object.kind = kind.into();
        MetricConfig::new("m", MetricSourceType::Object)
            .with_object(object)
            .with_collector_type(collector_type)
    }

    fn build(factory: &CollectorFactory, config: &MetricConfig) -> CollectorResult<()> {
        factory
            .new_collector(&deployment_hpa("app"), config, Duration::from_secs(30))
            .map(|_| ())
    }

    #[test]
    fn object_lookup_falls_back_in_order() {
        let built = Arc::new(Mutex::new(Vec::new()));
        let mut factory = CollectorFactory::new();
        factory.register_object_collector("Ingress", "prometheus", tagged("exact", &built));
        factory.register_object_collector("", "prometheus", tagged("any-kind", &built));
        factory.register_object_collector("Ingress", "", tagged("any-type", &built));

        build(&factory, &object_config("Ingress", "prometheus")).unwrap();
        build(&factory, &object_config("Pod", "prometheus")).unwrap();
        build(&factory, &object_config("Ingress", "skipper")).unwrap();

        assert_eq!(*built.lock().unwrap(), vec!["exact", "any-kind", "any-type"]);
    }

    #[test]
    fn pods_lookup_falls_back_to_wildcard() {
        let built = Arc::new(Mutex::new(Vec::new()));
        let mut factory = CollectorFactory::new();
        factory.register_pods_collector("prometheus", tagged("prometheus", &built));
        factory.register_pods_collector("", tagged("default", &built));

        let config = MetricConfig::new("m", MetricSourceType::Pods);
        build(&factory, &config.clone().with_collector_type("prometheus")).unwrap();
        build(&factory, &config.with_collector_type("json-path")).unwrap();

        assert_eq!(*built.lock().unwrap(), vec!["prometheus", "default"]);
    }

    #[test]
    fn external_lookup_is_by_metric_name() {
        let built = Arc::new(Mutex::new(Vec::new()));
        let mut factory = CollectorFactory::new();
        factory.register_external_collector(&["zmon-check", "sqs-queue-length"], tagged("ext", &built));

        build(&factory, &MetricConfig::new("sqs-queue-length", MetricSourceType::External)).unwrap();
        let err = build(&factory, &MetricConfig::new("other", MetricSourceType::External)).unwrap_err();

        assert!(matches!(err, CollectorError::NoPlugin { ref metric, .. } if metric == "other"));
        assert!(err.is_config());
        assert_eq!(built.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_plugin_is_reported() {
        let factory = CollectorFactory::new();
        let err = build(&factory, &object_config("Ingress", "prometheus")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no collector plugin found for metric 'm' (Object)"
        );
    }

    #[test]
    fn duplicate_registration_replaces() {
        let built = Arc::new(Mutex::new(Vec::new()));
        let mut factory = CollectorFactory::new();
        factory.register_pods_collector("prometheus", tagged("old", &built));
        factory.register_pods_collector("prometheus", tagged("new", &built));

        let config = MetricConfig::new("m", MetricSourceType::Pods).with_collector_type("prometheus");
        build(&factory, &config).unwrap();
        assert_eq!(*built.lock().unwrap(), vec!["new"]);
    }
}
