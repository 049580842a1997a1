//! Sequences the cluster and the metadata store for every pod lifecycle command.
//!
//! The cluster is always written first. When the second write fails, the coordinator either
//! compensates (create) or reports a [`PartialFailure`] describing what was left behind, so that
//! an operator or a retry can reconcile the two backends.

use metrics::counter;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::concurrency::Cancellation;
use crate::db::{PodStore, PodsDbError};
use crate::k8s::{K8sClient, K8sError, WorkloadPhase, WorkloadStatus};
use crate::metrics::{COMMAND, PODSYNC_PARTIAL_FAILURES_TOTAL};
use crate::pods::{Pod, PodSpec, PodValidationError};

/// Text recorded as the cause of a partial failure when the caller went away between steps.
const CANCELLED_CAUSE: &str = "the call was cancelled before the metadata store was written";

/// What the two backends disagree about after a partial failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialFailureKind {
    /// The workload runs in the cluster without a metadata record.
    OrphanedWorkload,
    /// The metadata record outlives its deleted workload.
    OrphanedRecord,
    /// The cluster runs the new spec while the metadata store holds the old one.
    DivergedSpec,
}

impl fmt::Display for PartialFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedWorkload => write!(f, "orphaned workload"),
            Self::OrphanedRecord => write!(f, "orphaned record"),
            Self::DivergedSpec => write!(f, "diverged spec"),
        }
    }
}

/// Everything needed to reconcile the backends by hand after a partial failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFailure {
    pub kind: PartialFailureKind,
    pub command: &'static str,
    pub pod_id: Option<i64>,
    pub namespace: String,
    pub name: String,
    /// Error of the step that failed after the cluster was written.
    pub cause: String,
    /// Error of the compensating action, when one was attempted and failed.
    pub compensation: Option<String>,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of pod {:?} in namespace {:?} left the backends inconsistent ({})",
            self.command, self.name, self.namespace, self.kind
        )?;
        if let Some(id) = self.pod_id {
            write!(f, " (id {id})")?;
        }
        write!(f, ": {}", self.cause)?;
        if let Some(compensation) = &self.compensation {
            write!(f, "; compensation failed: {compensation}")?;
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] PodValidationError),

    #[error("The pod with id {0} was not found")]
    NotFound(i64),

    #[error("A pod named {0:?} already exists")]
    DuplicateName(String),

    #[error("The cluster rejected the request: {0}")]
    ClusterBackend(K8sError),

    #[error("The circuit to the {0} is open")]
    CircuitOpen(&'static str),

    #[error("The metadata store failed: {0}")]
    MetadataStore(PodsDbError),

    #[error("{0}")]
    PartialFailure(Box<PartialFailure>),
}

impl From<K8sError> for SyncError {
    fn from(err: K8sError) -> Self {
        match err {
            K8sError::CircuitOpen(dependency) => SyncError::CircuitOpen(dependency),
            err => SyncError::ClusterBackend(err),
        }
    }
}

impl From<PodsDbError> for SyncError {
    fn from(err: PodsDbError) -> Self {
        match err {
            PodsDbError::DuplicateName(name) => SyncError::DuplicateName(name),
            err => SyncError::MetadataStore(err),
        }
    }
}

/// Phase of a pod's workload next to its record.
#[derive(Debug, Clone)]
pub struct PodStatus {
    pub pod: Pod,
    pub phase: WorkloadPhase,
    pub status: Option<WorkloadStatus>,
}

#[derive(Clone)]
pub struct PodCoordinator {
    k8s: Arc<dyn K8sClient>,
    store: Arc<dyn PodStore>,
}

impl PodCoordinator {
    pub fn new(k8s: Arc<dyn K8sClient>, store: Arc<dyn PodStore>) -> PodCoordinator {
        PodCoordinator { k8s, store }
    }

    /// Creates the workload, then the record, returning the id assigned by the store.
    ///
    /// A failed record write is compensated by deleting the workload again, unless it failed
    /// because a concurrent create took the name, in which case the workload belongs to both.
    pub async fn create(
        &self,
        spec: PodSpec,
        cancellation: &Cancellation,
    ) -> Result<i64, SyncError> {
        spec.validate()?;

        if self.store.read_pod_by_name(&spec.name).await?.is_some() {
            return Err(SyncError::DuplicateName(spec.name));
        }

        self.k8s.create_workload(&spec).await?;

        if cancellation.is_cancelled() {
            return Err(partial_failure(PartialFailure {
                kind: PartialFailureKind::OrphanedWorkload,
                command: "create",
                pod_id: None,
                namespace: spec.namespace,
                name: spec.name,
                cause: CANCELLED_CAUSE.to_string(),
                compensation: None,
            }));
        }

        let store_err = match self.store.create_pod(&spec).await {
            Ok(id) => {
                info!(id, name = spec.name, "pod created");
                return Ok(id);
            }
            Err(err) => err,
        };

        // A concurrent create took the name after the lookup above. The workload is shared
        // with the winner's record and must not be deleted.
        if matches!(store_err, PodsDbError::DuplicateName(_)) {
            let pod_id = match self.store.read_pod_by_name(&spec.name).await {
                Ok(existing) => existing.map(|pod| pod.id),
                Err(err) => {
                    warn!(name = spec.name, error = %err, "failed to look up the conflicting pod");
                    None
                }
            };

            return Err(partial_failure(PartialFailure {
                kind: PartialFailureKind::DivergedSpec,
                command: "create",
                pod_id,
                namespace: spec.namespace,
                name: spec.name,
                cause: store_err.to_string(),
                compensation: None,
            }));
        }

        warn!(
            name = spec.name,
            error = %store_err,
            "metadata write failed after the workload was created, deleting the workload"
        );

        match self
            .k8s
            .delete_workload(&spec.namespace, &spec.name)
            .await
        {
            Ok(()) => Err(store_err.into()),
            Err(compensation_err) => Err(partial_failure(PartialFailure {
                kind: PartialFailureKind::OrphanedWorkload,
                command: "create",
                pod_id: None,
                namespace: spec.namespace,
                name: spec.name,
                cause: store_err.to_string(),
                compensation: Some(compensation_err.to_string()),
            })),
        }
    }

    /// Deletes the workload, then the record. A workload already gone counts as deleted.
    pub async fn delete(&self, id: i64, cancellation: &Cancellation) -> Result<(), SyncError> {
        let pod = self.find_by_id(id).await?;

        self.k8s
            .delete_workload(&pod.spec.namespace, &pod.spec.name)
            .await?;

        let cause = if cancellation.is_cancelled() {
            CANCELLED_CAUSE.to_string()
        } else {
            match self.store.delete_pod(id).await {
                Ok(_) => {
                    info!(id, name = pod.spec.name, "pod deleted");
                    return Ok(());
                }
                Err(err) => err.to_string(),
            }
        };

        Err(partial_failure(PartialFailure {
            kind: PartialFailureKind::OrphanedRecord,
            command: "delete",
            pod_id: Some(id),
            namespace: pod.spec.namespace,
            name: pod.spec.name,
            cause,
            compensation: None,
        }))
    }

    /// Applies `spec` to the workload, then overwrites the whole record with it.
    pub async fn update(
        &self,
        id: i64,
        spec: PodSpec,
        cancellation: &Cancellation,
    ) -> Result<(), SyncError> {
        spec.validate()?;

        let current = self.find_by_id(id).await?;
        if current.spec.name != spec.name {
            return Err(PodValidationError::NameChanged {
                current: current.spec.name,
                requested: spec.name,
            }
            .into());
        }

        self.k8s.update_workload(&spec).await?;

        let pod = Pod { id, spec };
        let cause = if cancellation.is_cancelled() {
            CANCELLED_CAUSE.to_string()
        } else {
            match self.store.update_pod(&pod).await {
                Ok(Some(_)) => {
                    info!(id, name = pod.spec.name, "pod updated");
                    return Ok(());
                }
                // Deleted concurrently, the workload now runs without a record.
                Ok(None) => format!("the pod with id {id} was deleted concurrently"),
                Err(err) => err.to_string(),
            }
        };

        Err(partial_failure(PartialFailure {
            kind: PartialFailureKind::DivergedSpec,
            command: "update",
            pod_id: Some(id),
            namespace: pod.spec.namespace,
            name: pod.spec.name,
            cause,
            compensation: None,
        }))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Pod, SyncError> {
        self.store
            .read_pod(id)
            .await?
            .ok_or(SyncError::NotFound(id))
    }

    pub async fn find_all(&self) -> Result<Vec<Pod>, SyncError> {
        Ok(self.store.read_all_pods().await?)
    }

    pub async fn status(&self, id: i64) -> Result<PodStatus, SyncError> {
        let pod = self.find_by_id(id).await?;
        let status = self
            .k8s
            .get_workload_status(&pod.spec.namespace, &pod.spec.name)
            .await?;

        Ok(PodStatus {
            pod,
            phase: status.into(),
            status,
        })
    }
}

/// Reports a partial failure everywhere an operator may look for it.
fn partial_failure(failure: PartialFailure) -> SyncError {
    error!(
        command = failure.command,
        kind = %failure.kind,
        pod_id = failure.pod_id,
        namespace = %failure.namespace,
        name = %failure.name,
        cause = %failure.cause,
        compensation = failure.compensation.as_deref(),
        "cluster and metadata store diverged"
    );
    counter!(PODSYNC_PARTIAL_FAILURES_TOTAL, COMMAND => failure.command).increment(1);

    SyncError::PartialFailure(Box::new(failure))
}
