use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json, Path, ReqData},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_actix_web::RootSpan;
use utoipa::ToSchema;

use crate::coordinator::{PartialFailure, PodStatus, SyncError};
use crate::db::PodsDbError;
use crate::k8s::WorkloadPhase;
use crate::pods::{Pod, PodEnv, PodPort, PodSpec};
use crate::resilience::chain::{PodServiceError, ResilientPodService};
use crate::resilience::trace::TraceContext;
use crate::routes::ErrorMessage;

#[derive(Debug, Error)]
pub enum PodError {
    #[error(transparent)]
    PodService(#[from] PodServiceError),
}

impl PodError {
    pub fn to_message(&self) -> String {
        let PodError::PodService(err) = self;

        match err {
            // Do not expose internal database details in error messages
            PodServiceError::Sync(SyncError::MetadataStore(PodsDbError::Database(_)))
            | PodServiceError::TaskFailed(_) => "internal server error".to_string(),
            // The cause may carry database details, the compensation error comes from the cluster
            PodServiceError::Sync(SyncError::PartialFailure(failure)) => {
                partial_failure_message(failure)
            }
            // Every other message is ok, as they do not divulge sensitive information
            e => e.to_string(),
        }
    }
}

fn partial_failure_message(failure: &PartialFailure) -> String {
    let mut message = format!(
        "The {} of pod {:?} in namespace {:?} only partially completed ({})",
        failure.command, failure.name, failure.namespace, failure.kind
    );
    if let Some(id) = failure.pod_id {
        message.push_str(&format!(", pod id {id}"));
    }
    if let Some(compensation) = &failure.compensation {
        message.push_str(&format!(", compensation failed: {compensation}"));
    }
    message.push_str(", the cluster and the metadata store must be reconciled");

    message
}

impl ResponseError for PodError {
    fn status_code(&self) -> StatusCode {
        let PodError::PodService(err) = self;

        match err {
            PodServiceError::Throttled(_) => StatusCode::TOO_MANY_REQUESTS,
            PodServiceError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PodServiceError::Sync(err) => match err {
                SyncError::Validation(_) => StatusCode::BAD_REQUEST,
                SyncError::NotFound(_) => StatusCode::NOT_FOUND,
                SyncError::DuplicateName(_) => StatusCode::CONFLICT,
                SyncError::ClusterBackend(_) => StatusCode::BAD_GATEWAY,
                SyncError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
                SyncError::MetadataStore(_) | SyncError::PartialFailure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PodPortInfo {
    #[schema(example = 80)]
    pub container_port: i32,
    #[schema(example = 8080)]
    pub host_port: Option<i32>,
    #[schema(example = "TCP")]
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PodEnvInfo {
    #[schema(example = "LOG_LEVEL")]
    pub key: String,
    #[schema(example = "info")]
    pub value: String,
}

/// Wire form of a pod. Missing fields take their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PodInfo {
    /// Ignored on create. On update the id of the path is used.
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "web-1", required = true)]
    pub name: String,
    #[schema(example = "default")]
    pub namespace: String,
    #[schema(example = 7)]
    pub team_id: i64,
    #[schema(example = 0.1)]
    pub cpu_min: f32,
    #[schema(example = 0.5)]
    pub cpu_max: f32,
    #[schema(example = 128.0)]
    pub memory_min: f32,
    #[schema(example = 256.0)]
    pub memory_max: f32,
    #[schema(example = 2)]
    pub replicas: i32,
    pub ports: Vec<PodPortInfo>,
    pub env: Vec<PodEnvInfo>,
    #[schema(example = "IfNotPresent")]
    pub pull_policy: String,
    #[schema(example = "Always")]
    pub restart_policy: String,
    #[schema(example = "web")]
    pub pod_type: String,
    #[schema(example = "nginx:1.27", required = true)]
    pub image: String,
}

impl From<PodInfo> for PodSpec {
    fn from(info: PodInfo) -> Self {
        PodSpec {
            name: info.name,
            namespace: info.namespace,
            team_id: info.team_id,
            cpu_min: info.cpu_min,
            cpu_max: info.cpu_max,
            memory_min: info.memory_min,
            memory_max: info.memory_max,
            replicas: info.replicas,
            ports: info
                .ports
                .into_iter()
                .map(|port| PodPort {
                    container_port: port.container_port,
                    host_port: port.host_port,
                    protocol: port.protocol,
                })
                .collect(),
            env: info
                .env
                .into_iter()
                .map(|env| PodEnv {
                    key: env.key,
                    value: env.value,
                })
                .collect(),
            pull_policy: info.pull_policy,
            restart_policy: info.restart_policy,
            pod_type: info.pod_type,
            image: info.image,
        }
    }
}

impl From<Pod> for PodInfo {
    fn from(pod: Pod) -> Self {
        let spec = pod.spec;

        PodInfo {
            id: pod.id,
            name: spec.name,
            namespace: spec.namespace,
            team_id: spec.team_id,
            cpu_min: spec.cpu_min,
            cpu_max: spec.cpu_max,
            memory_min: spec.memory_min,
            memory_max: spec.memory_max,
            replicas: spec.replicas,
            ports: spec
                .ports
                .into_iter()
                .map(|port| PodPortInfo {
                    container_port: port.container_port,
                    host_port: port.host_port,
                    protocol: port.protocol,
                })
                .collect(),
            env: spec
                .env
                .into_iter()
                .map(|env| PodEnvInfo {
                    key: env.key,
                    value: env.value,
                })
                .collect(),
            pull_policy: spec.pull_policy,
            restart_policy: spec.restart_policy,
            pod_type: spec.pod_type,
            image: spec.image,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddPodResponse {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "pod added")]
    pub msg: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PodResponse {
    #[schema(example = "pod deleted")]
    pub msg: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AllPod {
    pub pod_info: Vec<PodInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadPhaseInfo {
    Missing,
    Pending,
    Degraded,
    Running,
}

impl From<WorkloadPhase> for WorkloadPhaseInfo {
    fn from(phase: WorkloadPhase) -> Self {
        match phase {
            WorkloadPhase::Missing => WorkloadPhaseInfo::Missing,
            WorkloadPhase::Pending => WorkloadPhaseInfo::Pending,
            WorkloadPhase::Degraded => WorkloadPhaseInfo::Degraded,
            WorkloadPhase::Running => WorkloadPhaseInfo::Running,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PodStatusResponse {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "web-1")]
    pub name: String,
    pub phase: WorkloadPhaseInfo,
    #[schema(example = 2)]
    pub desired_replicas: Option<i32>,
    #[schema(example = 2)]
    pub ready_replicas: Option<i32>,
    #[schema(example = 2)]
    pub available_replicas: Option<i32>,
}

impl From<PodStatus> for PodStatusResponse {
    fn from(status: PodStatus) -> Self {
        PodStatusResponse {
            id: status.pod.id,
            name: status.pod.spec.name,
            phase: status.phase.into(),
            desired_replicas: status.status.map(|s| s.desired_replicas),
            ready_replicas: status.status.map(|s| s.ready_replicas),
            available_replicas: status.status.map(|s| s.available_replicas),
        }
    }
}

#[utoipa::path(
    context_path = "/v1",
    request_body = PodInfo,
    responses(
        (status = 200, description = "Create the workload and the record of a new pod", body = AddPodResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 409, description = "A pod with the same name exists", body = ErrorMessage),
        (status = 429, description = "Too many requests", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
        (status = 502, description = "The cluster failed", body = ErrorMessage),
        (status = 503, description = "The circuit to the cluster is open", body = ErrorMessage),
    ),
    tag = "Pods"
)]
#[post("/pods")]
pub async fn add_pod(
    service: Data<ResilientPodService>,
    trace: ReqData<TraceContext>,
    pod: Json<PodInfo>,
) -> Result<impl Responder, PodError> {
    let pod = pod.into_inner();

    let id = service.add_pod(trace.into_inner(), pod.into()).await?;
    let response = AddPodResponse {
        id,
        msg: "pod added".to_string(),
    };

    Ok(Json(response))
}

#[utoipa::path(
    context_path = "/v1",
    params(
        ("pod_id" = i64, Path, description = "Id of the pod"),
    ),
    responses(
        (status = 200, description = "Delete the workload and the record of the pod", body = PodResponse),
        (status = 404, description = "Pod not found", body = ErrorMessage),
        (status = 429, description = "Too many requests", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
        (status = 502, description = "The cluster failed", body = ErrorMessage),
        (status = 503, description = "The circuit to the cluster is open", body = ErrorMessage),
    ),
    tag = "Pods"
)]
#[delete("/pods/{pod_id}")]
pub async fn delete_pod(
    service: Data<ResilientPodService>,
    trace: ReqData<TraceContext>,
    pod_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, PodError> {
    let pod_id = pod_id.into_inner();

    root_span.record("pod_id", pod_id);

    service.delete_pod(trace.into_inner(), pod_id).await?;
    let response = PodResponse {
        msg: "pod deleted".to_string(),
    };

    Ok(Json(response))
}

#[utoipa::path(
    context_path = "/v1",
    request_body = PodInfo,
    params(
        ("pod_id" = i64, Path, description = "Id of the pod"),
    ),
    responses(
        (status = 200, description = "Update the workload and the record of the pod", body = PodResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 404, description = "Pod not found", body = ErrorMessage),
        (status = 429, description = "Too many requests", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
        (status = 502, description = "The cluster failed", body = ErrorMessage),
        (status = 503, description = "The circuit to the cluster is open", body = ErrorMessage),
    ),
    tag = "Pods"
)]
#[post("/pods/{pod_id}")]
pub async fn update_pod(
    service: Data<ResilientPodService>,
    trace: ReqData<TraceContext>,
    pod_id: Path<i64>,
    pod: Json<PodInfo>,
    root_span: RootSpan,
) -> Result<impl Responder, PodError> {
    let pod_id = pod_id.into_inner();
    let pod = pod.into_inner();

    root_span.record("pod_id", pod_id);

    service
        .update_pod(trace.into_inner(), pod_id, pod.into())
        .await?;
    let response = PodResponse {
        msg: "pod updated".to_string(),
    };

    Ok(Json(response))
}

#[utoipa::path(
    context_path = "/v1",
    params(
        ("pod_id" = i64, Path, description = "Id of the pod"),
    ),
    responses(
        (status = 200, description = "Return pod with id = pod_id", body = PodInfo),
        (status = 404, description = "Pod not found", body = ErrorMessage),
        (status = 429, description = "Too many requests", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
    ),
    tag = "Pods"
)]
#[get("/pods/{pod_id}")]
pub async fn find_pod_by_id(
    service: Data<ResilientPodService>,
    trace: ReqData<TraceContext>,
    pod_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, PodError> {
    let pod_id = pod_id.into_inner();

    root_span.record("pod_id", pod_id);

    let pod = service.find_pod_by_id(trace.into_inner(), pod_id).await?;
    let response: PodInfo = pod.into();

    Ok(Json(response))
}

#[utoipa::path(
    context_path = "/v1",
    responses(
        (status = 200, description = "Return all pods", body = AllPod),
        (status = 429, description = "Too many requests", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
    ),
    tag = "Pods"
)]
#[get("/pods")]
pub async fn find_all_pods(
    service: Data<ResilientPodService>,
    trace: ReqData<TraceContext>,
) -> Result<impl Responder, PodError> {
    let pods = service.find_all_pods(trace.into_inner()).await?;
    let response = AllPod {
        pod_info: pods.into_iter().map(Into::into).collect(),
    };

    Ok(Json(response))
}

#[utoipa::path(
    context_path = "/v1",
    params(
        ("pod_id" = i64, Path, description = "Id of the pod"),
    ),
    responses(
        (status = 200, description = "Return the workload phase of the pod", body = PodStatusResponse),
        (status = 404, description = "Pod not found", body = ErrorMessage),
        (status = 429, description = "Too many requests", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage),
        (status = 502, description = "The cluster failed", body = ErrorMessage),
        (status = 503, description = "The circuit to the cluster is open", body = ErrorMessage),
    ),
    tag = "Pods"
)]
#[get("/pods/{pod_id}/status")]
pub async fn get_pod_status(
    service: Data<ResilientPodService>,
    trace: ReqData<TraceContext>,
    pod_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, PodError> {
    let pod_id = pod_id.into_inner();

    root_span.record("pod_id", pod_id);

    let status = service.pod_status(trace.into_inner(), pod_id).await?;
    let response: PodStatusResponse = status.into();

    Ok(Json(response))
}
