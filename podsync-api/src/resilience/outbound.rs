use async_trait::async_trait;
use metrics::{counter, histogram};
use podsync_config::shared::CircuitBreakerConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug};

use crate::db::{PodStore, PodsDbError};
use crate::k8s::{K8sClient, K8sError, WorkloadStatus};
use crate::metrics::{
    BACKEND, CLUSTER_BACKEND, DEPENDENCY, OPERATION, OUTCOME, OUTCOME_ERROR, OUTCOME_OK,
    PODSYNC_BACKEND_CALL_DURATION_SECONDS, PODSYNC_BACKEND_CALLS_TOTAL,
    PODSYNC_CIRCUIT_REJECTIONS_TOTAL, STORE_BACKEND,
};
use crate::pods::{Pod, PodSpec};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::resilience::trace::{TraceContext, current_trace, with_trace};

/// Name of the cluster dependency in breaker errors, logs and metrics.
pub const CLUSTER_DEPENDENCY: &str = "cluster";

/// Runs one backend call in a child span of the current trace and records its outcome.
async fn observe<T, E, F>(backend: &'static str, operation: &'static str, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let trace = current_trace()
        .map(|trace| trace.child())
        .unwrap_or_else(TraceContext::new_root);
    let span = trace.span(backend, operation);

    let start = Instant::now();
    let result = with_trace(trace, call).instrument(span).await;
    let outcome = if result.is_ok() {
        OUTCOME_OK
    } else {
        OUTCOME_ERROR
    };

    counter!(
        PODSYNC_BACKEND_CALLS_TOTAL,
        BACKEND => backend,
        OPERATION => operation,
        OUTCOME => outcome
    )
    .increment(1);
    histogram!(
        PODSYNC_BACKEND_CALL_DURATION_SECONDS,
        BACKEND => backend,
        OPERATION => operation
    )
    .record(start.elapsed().as_secs_f64());

    result
}

/// [`K8sClient`] that sends every call through a circuit breaker and a child trace span.
pub struct GuardedK8sClient {
    inner: Arc<dyn K8sClient>,
    breaker: CircuitBreaker,
}

impl GuardedK8sClient {
    pub fn new(inner: Arc<dyn K8sClient>, config: CircuitBreakerConfig) -> GuardedK8sClient {
        GuardedK8sClient {
            inner,
            breaker: CircuitBreaker::new(CLUSTER_DEPENDENCY, config),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn call<T, F>(&self, operation: &'static str, call: F) -> Result<T, K8sError>
    where
        F: Future<Output = Result<T, K8sError>>,
    {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(operation, "cluster call rejected by the open circuit");
                counter!(PODSYNC_CIRCUIT_REJECTIONS_TOTAL, DEPENDENCY => CLUSTER_DEPENDENCY)
                    .increment(1);
                return Err(K8sError::CircuitOpen(CLUSTER_DEPENDENCY));
            }
        };

        let result = observe(CLUSTER_BACKEND, operation, call).await;
        match &result {
            Ok(_) => permit.record_success(),
            Err(_) => permit.record_failure(),
        }

        result
    }
}

#[async_trait]
impl K8sClient for GuardedK8sClient {
    async fn create_workload(&self, spec: &PodSpec) -> Result<(), K8sError> {
        self.call("create_workload", self.inner.create_workload(spec))
            .await
    }

    async fn update_workload(&self, spec: &PodSpec) -> Result<(), K8sError> {
        self.call("update_workload", self.inner.update_workload(spec))
            .await
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), K8sError> {
        self.call("delete_workload", self.inner.delete_workload(namespace, name))
            .await
    }

    async fn get_workload_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, K8sError> {
        self.call(
            "get_workload_status",
            self.inner.get_workload_status(namespace, name),
        )
        .await
    }
}

/// [`PodStore`] that runs every call in a child trace span.
pub struct TracedPodStore {
    inner: Arc<dyn PodStore>,
}

impl TracedPodStore {
    pub fn new(inner: Arc<dyn PodStore>) -> TracedPodStore {
        TracedPodStore { inner }
    }
}

#[async_trait]
impl PodStore for TracedPodStore {
    async fn create_pod(&self, spec: &PodSpec) -> Result<i64, PodsDbError> {
        observe(STORE_BACKEND, "create_pod", self.inner.create_pod(spec)).await
    }

    async fn read_pod(&self, id: i64) -> Result<Option<Pod>, PodsDbError> {
        observe(STORE_BACKEND, "read_pod", self.inner.read_pod(id)).await
    }

    async fn read_pod_by_name(&self, name: &str) -> Result<Option<Pod>, PodsDbError> {
        observe(
            STORE_BACKEND,
            "read_pod_by_name",
            self.inner.read_pod_by_name(name),
        )
        .await
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Option<i64>, PodsDbError> {
        observe(STORE_BACKEND, "update_pod", self.inner.update_pod(pod)).await
    }

    async fn delete_pod(&self, id: i64) -> Result<Option<i64>, PodsDbError> {
        observe(STORE_BACKEND, "delete_pod", self.inner.delete_pod(id)).await
    }

    async fn read_all_pods(&self) -> Result<Vec<Pod>, PodsDbError> {
        observe(STORE_BACKEND, "read_all_pods", self.inner.read_all_pods()).await
    }
}
