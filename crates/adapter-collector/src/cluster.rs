//! Read-only cluster API access used by collectors.
//!
//! Collectors read routing rules of ingress objects and the ready replica
//! count of scale targets. Errors are returned as collector failures and
//! never retried here.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use adapter_core::AutoscalerRef;

use crate::error::CollectorResult;

/// The parts of an ingress object collectors care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingress {
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub host: String,
}

/// Status of a replicated workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub ready_replicas: i32,
}

/// Read access to cluster objects, by namespace and name.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_ingress(&self, namespace: &str, name: &str) -> CollectorResult<Ingress>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> CollectorResult<WorkloadStatus>;

    async fn get_stateful_set(&self, namespace: &str, name: &str)
        -> CollectorResult<WorkloadStatus>;
}

/// Resolves how many ready replicas an autoscaler's target has.
#[async_trait]
pub trait ReplicaResolver: Send + Sync {
    async fn ready_replicas(&self, hpa: &AutoscalerRef) -> CollectorResult<i32>;
}

/// Reads ready replicas of `Deployment` and `StatefulSet` targets from the
/// cluster. Any other kind resolves to zero replicas.
#[derive(Clone)]
pub struct ScaleTargetReplicas {
    client: Arc<dyn ClusterClient>,
}

impl ScaleTargetReplicas {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplicaResolver for ScaleTargetReplicas {
    async fn ready_replicas(&self, hpa: &AutoscalerRef) -> CollectorResult<i32> {
        let target = &hpa.scale_target;
        let replicas = match target.kind.as_str() {
            "Deployment" => {
                self.client
                    .get_deployment(&hpa.namespace, &target.name)
                    .await?
                    .ready_replicas
            }
            "StatefulSet" => {
                self.client
                    .get_stateful_set(&hpa.namespace, &target.name)
                    .await?
                    .ready_replicas
            }
            other => {
                debug!(kind = %other, hpa = %hpa, "unsupported scale target kind");
                0
            }
        };
        Ok(replicas)
    }
}
