use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ClusterSettings;
use crate::k8s::{K8sClient, K8sError, WorkloadStatus};
use crate::pods::PodSpec;

/// Label holding the pod name, used as the deployment selector.
const NAME_LABEL: &str = "app.kubernetes.io/name";
/// Label marking objects owned by this service.
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`].
const MANAGED_BY: &str = "podsync";
/// Label holding the owning team.
const TEAM_LABEL: &str = "podsync.io/team-id";
/// Label holding the pod type.
const TYPE_LABEL: &str = "podsync.io/type";
/// Protocol used for ports that do not name one.
const DEFAULT_PROTOCOL: &str = "TCP";
/// Suffix of memory quantities, memory bounds being expressed in MiB.
const MEMORY_UNIT: &str = "Mi";

/// [`K8sClient`] backed by the Kubernetes API server.
///
/// Each pod maps to a `Deployment` with a single container. Create and update both use
/// server-side apply, so repeating either call converges to the same object.
pub struct HttpK8sClient {
    client: Client,
    default_namespace: String,
    field_manager: String,
    request_timeout: Duration,
}

impl fmt::Debug for HttpK8sClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpK8sClient")
            .field("default_namespace", &self.default_namespace)
            .field("field_manager", &self.field_manager)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpK8sClient {
    /// Builds a client from the ambient kube configuration.
    pub async fn new(settings: &ClusterSettings) -> Result<HttpK8sClient, K8sError> {
        let client = Client::try_default().await?;

        Ok(HttpK8sClient::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: &ClusterSettings) -> HttpK8sClient {
        HttpK8sClient {
            client,
            default_namespace: settings.default_namespace.clone(),
            field_manager: settings.field_manager.clone(),
            request_timeout: settings.request_timeout(),
        }
    }

    fn namespace<'a>(&'a self, namespace: &'a str) -> &'a str {
        if namespace.is_empty() {
            &self.default_namespace
        } else {
            namespace
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), self.namespace(namespace))
    }

    async fn with_timeout<T, F>(&self, request: F) -> Result<T, K8sError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(K8sError::Timeout(self.request_timeout)),
        }
    }

    async fn apply_deployment(&self, spec: &PodSpec) -> Result<(), K8sError> {
        let namespace = self.namespace(&spec.namespace);
        let deployment = build_deployment(spec, namespace)?;

        let params = PatchParams::apply(&self.field_manager).force();
        self.with_timeout(self.deployments(namespace).patch(
            &spec.name,
            &params,
            &Patch::Apply(&deployment),
        ))
        .await?;

        Ok(())
    }
}

#[async_trait]
impl K8sClient for HttpK8sClient {
    async fn create_workload(&self, spec: &PodSpec) -> Result<(), K8sError> {
        self.apply_deployment(spec).await?;
        info!(name = spec.name, "deployment applied");

        Ok(())
    }

    async fn update_workload(&self, spec: &PodSpec) -> Result<(), K8sError> {
        self.apply_deployment(spec).await?;
        info!(name = spec.name, "deployment updated");

        Ok(())
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), K8sError> {
        let result = self
            .with_timeout(
                self.deployments(namespace)
                    .delete(name, &DeleteParams::background()),
            )
            .await;

        match result {
            Ok(_) => {
                info!(name, "deployment deleted");
                Ok(())
            }
            Err(K8sError::Kube(kube::Error::Api(response))) if response.code == 404 => {
                debug!(name, "deployment already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn get_workload_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadStatus>, K8sError> {
        let deployment = self
            .with_timeout(self.deployments(namespace).get_opt(name))
            .await?;

        Ok(deployment.map(|deployment| workload_status(&deployment)))
    }
}

fn workload_status(deployment: &Deployment) -> WorkloadStatus {
    let desired_replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();

    WorkloadStatus {
        desired_replicas,
        ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        available_replicas: status.and_then(|s| s.available_replicas).unwrap_or(0),
    }
}

/// Builds the `Deployment` manifest applied for `spec`.
///
/// Cluster-spec attributes (image, pull policy, restart policy) are copied verbatim; empty
/// values are left out so that cluster defaults apply.
pub fn build_deployment(spec: &PodSpec, namespace: &str) -> Result<Deployment, K8sError> {
    let labels = json!({
        NAME_LABEL: spec.name,
        MANAGED_BY_LABEL: MANAGED_BY,
        TEAM_LABEL: spec.team_id.to_string(),
        TYPE_LABEL: spec.pod_type,
    });

    let ports: Vec<_> = spec
        .ports
        .iter()
        .map(|port| {
            let protocol = if port.protocol.is_empty() {
                DEFAULT_PROTOCOL
            } else {
                port.protocol.as_str()
            };
            let mut value = json!({
                "containerPort": port.container_port,
                "protocol": protocol,
            });
            if let Some(host_port) = port.host_port {
                value["hostPort"] = json!(host_port);
            }
            value
        })
        .collect();

    let env: Vec<_> = spec
        .env
        .iter()
        .map(|env| json!({ "name": env.key, "value": env.value }))
        .collect();

    let mut container = json!({
        "name": spec.name,
        "image": spec.image,
        "ports": ports,
        "env": env,
        "resources": {
            "requests": {
                "cpu": spec.cpu_min.to_string(),
                "memory": format!("{}{MEMORY_UNIT}", spec.memory_min),
            },
            "limits": {
                "cpu": spec.cpu_max.to_string(),
                "memory": format!("{}{MEMORY_UNIT}", spec.memory_max),
            }
        }
    });
    if !spec.pull_policy.is_empty() {
        container["imagePullPolicy"] = json!(spec.pull_policy);
    }

    let mut pod_spec = json!({ "containers": [container] });
    if !spec.restart_policy.is_empty() {
        pod_spec["restartPolicy"] = json!(spec.restart_policy);
    }

    let deployment = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": spec.name,
            "namespace": namespace,
            "labels": labels,
        },
        "spec": {
            "replicas": spec.replicas,
            "selector": {
                "matchLabels": { NAME_LABEL: spec.name }
            },
            "template": {
                "metadata": { "labels": labels },
                "spec": pod_spec,
            }
        }
    });

    Ok(serde_json::from_value(deployment)?)
}
