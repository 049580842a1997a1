use metrics::counter;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{Instrument, Span, warn};

use crate::concurrency::{Cancellation, cancellation_pair};
use crate::coordinator::{PodCoordinator, PodStatus, SyncError};
use crate::metrics::PODSYNC_RPC_THROTTLED_TOTAL;
use crate::pods::{Pod, PodSpec};
use crate::resilience::rate_limiter::{RateLimiter, Throttled};
use crate::resilience::trace::{TraceContext, with_trace};

#[derive(Debug, Error)]
pub enum PodServiceError {
    #[error(transparent)]
    Throttled(#[from] Throttled),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("The pod command did not run to completion: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Entry point of every pod operation.
///
/// Each call is traced, admitted by the rate limiter, then run by the coordinator on its own
/// task. Dropping the returned future never interrupts a backend call; it only tells the
/// coordinator to stop before its next step.
#[derive(Clone)]
pub struct ResilientPodService {
    coordinator: PodCoordinator,
    rate_limiter: Arc<RateLimiter>,
}

impl ResilientPodService {
    pub fn new(coordinator: PodCoordinator, rate_limiter: Arc<RateLimiter>) -> ResilientPodService {
        ResilientPodService {
            coordinator,
            rate_limiter,
        }
    }

    pub async fn add_pod(&self, trace: TraceContext, spec: PodSpec) -> Result<i64, PodServiceError> {
        self.dispatch(trace, "add_pod", |coordinator, cancellation| async move {
            coordinator.create(spec, &cancellation).await
        })
        .await
    }

    pub async fn delete_pod(&self, trace: TraceContext, id: i64) -> Result<(), PodServiceError> {
        self.dispatch(trace, "delete_pod", move |coordinator, cancellation| async move {
            coordinator.delete(id, &cancellation).await
        })
        .await
    }

    pub async fn update_pod(
        &self,
        trace: TraceContext,
        id: i64,
        spec: PodSpec,
    ) -> Result<(), PodServiceError> {
        self.dispatch(trace, "update_pod", move |coordinator, cancellation| async move {
            coordinator.update(id, spec, &cancellation).await
        })
        .await
    }

    pub async fn find_pod_by_id(&self, trace: TraceContext, id: i64) -> Result<Pod, PodServiceError> {
        self.dispatch(trace, "find_pod_by_id", move |coordinator, _| async move {
            coordinator.find_by_id(id).await
        })
        .await
    }

    pub async fn find_all_pods(&self, trace: TraceContext) -> Result<Vec<Pod>, PodServiceError> {
        self.dispatch(trace, "find_all_pods", |coordinator, _| async move {
            coordinator.find_all().await
        })
        .await
    }

    pub async fn pod_status(
        &self,
        trace: TraceContext,
        id: i64,
    ) -> Result<PodStatus, PodServiceError> {
        self.dispatch(trace, "pod_status", move |coordinator, _| async move {
            coordinator.status(id).await
        })
        .await
    }

    async fn dispatch<T, F, Fut>(
        &self,
        trace: TraceContext,
        operation: &'static str,
        command: F,
    ) -> Result<T, PodServiceError>
    where
        F: FnOnce(PodCoordinator, Cancellation) -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
        T: Send + 'static,
    {
        let span = trace.span("rpc", operation);

        async move {
            if let Err(err) = self.rate_limiter.try_acquire() {
                warn!(operation, "call throttled");
                counter!(PODSYNC_RPC_THROTTLED_TOTAL).increment(1);
                return Err(err.into());
            }

            let (guard, cancellation) = cancellation_pair();
            let command = command(self.coordinator.clone(), cancellation);
            let task = tokio::spawn(with_trace(trace, command).instrument(Span::current()));

            let result = task.await;
            drop(guard);

            Ok(result??)
        }
        .instrument(span)
        .await
    }
}
