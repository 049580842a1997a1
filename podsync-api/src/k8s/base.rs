use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::pods::PodSpec;

/// Errors emitted by the cluster backend.
#[derive(Debug, Error)]
pub enum K8sError {
    /// A serialization error while building a Kubernetes manifest.
    #[error("An error occurred in serde when dealing with K8s: {0}")]
    Serde(#[from] serde_json::error::Error),

    /// An error returned by the [`kube`] client when talking to the API server.
    #[error("An error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),

    /// The API server did not answer within the configured request timeout.
    #[error("The K8s request did not complete within {0:?}")]
    Timeout(Duration),

    /// The circuit breaker in front of the cluster rejected the call without attempting it.
    #[error("The circuit for {0} is open, the call was not attempted")]
    CircuitOpen(&'static str),
}

impl K8sError {
    /// Returns `true` if the call was rejected by a circuit breaker rather than failed by K8s.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, K8sError::CircuitOpen(_))
    }
}

/// Replica counts reported by the cluster for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
}

/// A simplified view of a workload's health derived from [`WorkloadStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadPhase {
    /// The cluster has no workload with this name.
    Missing,
    /// No replica is ready yet.
    Pending,
    /// Some but not all desired replicas are ready.
    Degraded,
    /// Every desired replica is ready (trivially true for zero replicas).
    Running,
}

impl From<Option<WorkloadStatus>> for WorkloadPhase {
    fn from(status: Option<WorkloadStatus>) -> Self {
        match status {
            None => WorkloadPhase::Missing,
            Some(status) if status.ready_replicas >= status.desired_replicas => {
                WorkloadPhase::Running
            }
            Some(status) if status.ready_replicas == 0 => WorkloadPhase::Pending,
            Some(_) => WorkloadPhase::Degraded,
        }
    }
}

/// Operations the coordinator needs from the cluster orchestrator.
///
/// Workloads are identified by the pod name within the pod namespace. Implementations must be
/// idempotent on the name: creating or updating an existing workload converges it to the given
/// spec, and deleting a missing workload succeeds.
#[async_trait]
pub trait K8sClient: Send + Sync {
    /// Creates the workload for `spec`, or converges an existing one with the same name.
    async fn create_workload(&self, spec: &PodSpec) -> Result<(), K8sError>;

    /// Rewrites the workload for `spec`.
    async fn update_workload(&self, spec: &PodSpec) -> Result<(), K8sError>;

    /// Deletes the workload if it exists.
    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), K8sError>;

    /// Returns the current replica counts, or `None` if the workload does not exist.
    async fn get_workload_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, K8sError>;
}
