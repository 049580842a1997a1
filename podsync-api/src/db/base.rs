use async_trait::async_trait;
use thiserror::Error;

use crate::pods::{Pod, PodSpec};

#[derive(Debug, Error)]
pub enum PodsDbError {
    #[error("Error while interacting with PostgreSQL for pods: {0}")]
    Database(#[from] sqlx::Error),

    #[error("A pod named {0:?} already exists")]
    DuplicateName(String),
}

/// Durable record of every pod and its child port and env rows.
///
/// A pod and its children are always written and removed together, so readers never see a
/// pod with a partial set of ports or env entries.
#[async_trait]
pub trait PodStore: Send + Sync {
    /// Inserts the pod and its children, returning the assigned id.
    async fn create_pod(&self, spec: &PodSpec) -> Result<i64, PodsDbError>;

    async fn read_pod(&self, id: i64) -> Result<Option<Pod>, PodsDbError>;

    async fn read_pod_by_name(&self, name: &str) -> Result<Option<Pod>, PodsDbError>;

    /// Overwrites every field of the pod and replaces its children.
    ///
    /// Returns `None` when no pod has the given id.
    async fn update_pod(&self, pod: &Pod) -> Result<Option<i64>, PodsDbError>;

    /// Removes the pod and its children. Returns `None` when no pod has the given id.
    async fn delete_pod(&self, id: i64) -> Result<Option<i64>, PodsDbError>;

    /// Returns every pod ordered by id.
    async fn read_all_pods(&self) -> Result<Vec<Pod>, PodsDbError>;
}
