#![allow(dead_code)]

use async_trait::async_trait;
use podsync_api::concurrency::CancelGuard;
use podsync_api::k8s::{K8sClient, K8sError, WorkloadStatus};
use podsync_api::pods::PodSpec;
use podsync_api::resilience::trace::current_trace;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const CREATE: &str = "create_workload";
pub const UPDATE: &str = "update_workload";
pub const DELETE: &str = "delete_workload";
pub const STATUS: &str = "get_workload_status";

#[derive(Default)]
struct State {
    workloads: BTreeMap<String, PodSpec>,
    statuses: BTreeMap<String, WorkloadStatus>,
    failing: HashSet<&'static str>,
    calls: Vec<(&'static str, String)>,
    trace_ids: Vec<Option<String>>,
    drop_on_create: Option<CancelGuard>,
    completed_creates: usize,
}

/// Scriptable cluster keeping workloads in memory.
///
/// Failing operations return a timeout without touching the workloads.
#[derive(Default)]
pub struct MockK8sClient {
    state: Mutex<State>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    create_entered: Notify,
}

impl MockK8sClient {
    pub fn new() -> Arc<MockK8sClient> {
        Arc::new(MockK8sClient::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state().failing.remove(operation);
    }

    pub fn workload(&self, name: &str) -> Option<PodSpec> {
        self.state().workloads.get(name).cloned()
    }

    pub fn workload_count(&self) -> usize {
        self.state().workloads.len()
    }

    /// Removes a workload behind the coordinator's back.
    pub fn remove_out_of_band(&self, name: &str) {
        self.state().workloads.remove(name);
    }

    pub fn set_status(&self, name: &str, status: WorkloadStatus) {
        self.state().statuses.insert(name.to_string(), status);
    }

    /// Returns how many times `operation` was invoked, failed calls included.
    pub fn calls(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn trace_ids(&self) -> Vec<Option<String>> {
        self.state().trace_ids.clone()
    }

    pub fn completed_creates(&self) -> usize {
        self.state().completed_creates
    }

    /// Drops `guard` while the next create is in flight, as if the caller went away.
    pub fn cancel_during_create(&self, guard: CancelGuard) {
        self.state().drop_on_create = Some(guard);
    }

    /// Holds every create until the returned [`Notify`] is notified.
    pub fn hold_creates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a create has started.
    pub async fn create_started(&self) {
        self.create_entered.notified().await
    }

    fn record(&self, operation: &'static str, name: &str) -> Result<(), K8sError> {
        let mut state = self.state();
        state.calls.push((operation, name.to_string()));
        state
            .trace_ids
            .push(current_trace().map(|trace| trace.trace_id));

        if state.failing.contains(operation) {
            return Err(K8sError::Timeout(Duration::from_secs(1)));
        }

        Ok(())
    }
}

#[async_trait]
impl K8sClient for MockK8sClient {
    async fn create_workload(&self, spec: &PodSpec) -> Result<(), K8sError> {
        self.record(CREATE, &spec.name)?;

        self.create_entered.notify_one();
        let gate = self.create_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state();
        state.workloads.insert(spec.name.clone(), spec.clone());
        state.completed_creates += 1;
        let guard = state.drop_on_create.take();
        drop(state);
        drop(guard);

        Ok(())
    }

    async fn update_workload(&self, spec: &PodSpec) -> Result<(), K8sError> {
        self.record(UPDATE, &spec.name)?;
        self.state()
            .workloads
            .insert(spec.name.clone(), spec.clone());

        Ok(())
    }

    async fn delete_workload(&self, _namespace: &str, name: &str) -> Result<(), K8sError> {
        self.record(DELETE, name)?;
        self.state().workloads.remove(name);

        Ok(())
    }

    async fn get_workload_status(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, K8sError> {
        self.record(STATUS, name)?;
        let state = self.state();

        if let Some(status) = state.statuses.get(name) {
            return Ok(Some(*status));
        }

        Ok(state.workloads.get(name).map(|spec| WorkloadStatus {
            desired_replicas: spec.replicas,
            ready_replicas: spec.replicas,
            available_replicas: spec.replicas,
        }))
    }
}
