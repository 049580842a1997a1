#![allow(dead_code)]

use async_trait::async_trait;
use podsync_api::db::memory::MemoryPodStore;
use podsync_api::db::{PodStore, PodsDbError};
use podsync_api::pods::{Pod, PodSpec};
use podsync_api::resilience::trace::current_trace;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CREATE_POD: &str = "create_pod";
pub const UPDATE_POD: &str = "update_pod";
pub const DELETE_POD: &str = "delete_pod";
pub const READ_POD: &str = "read_pod";

/// [`MemoryPodStore`] with failure injection and trace recording.
#[derive(Default)]
pub struct TestPodStore {
    inner: MemoryPodStore,
    failing: Mutex<HashSet<&'static str>>,
    trace_ids: Mutex<Vec<Option<String>>>,
    missed_name_lookups: AtomicUsize,
}

impl TestPodStore {
    pub fn new() -> Arc<TestPodStore> {
        Arc::new(TestPodStore::default())
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    /// Makes the next `count` name lookups report no pod, as if a concurrent create had not
    /// committed yet.
    pub fn miss_name_lookups(&self, count: usize) {
        self.missed_name_lookups.store(count, Ordering::SeqCst);
    }

    pub fn trace_ids(&self) -> Vec<Option<String>> {
        self.trace_ids.lock().unwrap().clone()
    }

    pub async fn pods(&self) -> Vec<Pod> {
        self.inner.read_all_pods().await.unwrap()
    }

    fn check(&self, operation: &'static str) -> Result<(), PodsDbError> {
        self.trace_ids
            .lock()
            .unwrap()
            .push(current_trace().map(|trace| trace.trace_id));

        if self.failing.lock().unwrap().contains(operation) {
            return Err(PodsDbError::Database(sqlx::Error::PoolTimedOut));
        }

        Ok(())
    }
}

#[async_trait]
impl PodStore for TestPodStore {
    async fn create_pod(&self, spec: &PodSpec) -> Result<i64, PodsDbError> {
        self.check(CREATE_POD)?;
        self.inner.create_pod(spec).await
    }

    async fn read_pod(&self, id: i64) -> Result<Option<Pod>, PodsDbError> {
        self.check(READ_POD)?;
        self.inner.read_pod(id).await
    }

    async fn read_pod_by_name(&self, name: &str) -> Result<Option<Pod>, PodsDbError> {
        self.check("read_pod_by_name")?;
        let missed = self
            .missed_name_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }

        self.inner.read_pod_by_name(name).await
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Option<i64>, PodsDbError> {
        self.check(UPDATE_POD)?;
        self.inner.update_pod(pod).await
    }

    async fn delete_pod(&self, id: i64) -> Result<Option<i64>, PodsDbError> {
        self.check(DELETE_POD)?;
        self.inner.delete_pod(id).await
    }

    async fn read_all_pods(&self) -> Result<Vec<Pod>, PodsDbError> {
        self.check("read_all_pods")?;
        self.inner.read_all_pods().await
    }
}
