use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{PodStore, PodsDbError};
use crate::pods::{Pod, PodSpec};

#[derive(Debug)]
struct Inner {
    pods: BTreeMap<i64, PodSpec>,
    next_id: i64,
}

impl Inner {
    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.pods
            .iter()
            .any(|(id, spec)| spec.name == name && Some(*id) != except)
    }
}

/// In-process [`PodStore`] with the same uniqueness rules as the Postgres store.
///
/// The server always runs against Postgres. This store backs the integration tests, which
/// wrap it to inject failures.
#[derive(Debug, Clone)]
pub struct MemoryPodStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryPodStore {
    pub fn new() -> Self {
        let inner = Inner {
            pods: BTreeMap::new(),
            next_id: 1,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }
}

impl Default for MemoryPodStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PodStore for MemoryPodStore {
    async fn create_pod(&self, spec: &PodSpec) -> Result<i64, PodsDbError> {
        let mut inner = self.inner.lock().await;

        if inner.name_taken(&spec.name, None) {
            return Err(PodsDbError::DuplicateName(spec.name.clone()));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.pods.insert(id, spec.clone());

        Ok(id)
    }

    async fn read_pod(&self, id: i64) -> Result<Option<Pod>, PodsDbError> {
        let inner = self.inner.lock().await;

        Ok(inner.pods.get(&id).map(|spec| Pod {
            id,
            spec: spec.clone(),
        }))
    }

    async fn read_pod_by_name(&self, name: &str) -> Result<Option<Pod>, PodsDbError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .pods
            .iter()
            .find(|(_, spec)| spec.name == name)
            .map(|(id, spec)| Pod {
                id: *id,
                spec: spec.clone(),
            }))
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Option<i64>, PodsDbError> {
        let mut inner = self.inner.lock().await;

        if !inner.pods.contains_key(&pod.id) {
            return Ok(None);
        }
        if inner.name_taken(&pod.spec.name, Some(pod.id)) {
            return Err(PodsDbError::DuplicateName(pod.spec.name.clone()));
        }

        inner.pods.insert(pod.id, pod.spec.clone());

        Ok(Some(pod.id))
    }

    async fn delete_pod(&self, id: i64) -> Result<Option<i64>, PodsDbError> {
        let mut inner = self.inner.lock().await;

        Ok(inner.pods.remove(&id).map(|_| id))
    }

    async fn read_all_pods(&self) -> Result<Vec<Pod>, PodsDbError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .pods
            .iter()
            .map(|(id, spec)| Pod {
                id: *id,
                spec: spec.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pods::{PodEnv, PodPort};

    fn spec(name: &str) -> PodSpec {
        PodSpec {
            name: name.to_string(),
            namespace: "default".to_string(),
            team_id: 1,
            cpu_min: 0.1,
            cpu_max: 0.2,
            memory_min: 64.0,
            memory_max: 128.0,
            replicas: 1,
            ports: vec![PodPort {
                container_port: 80,
                host_port: None,
                protocol: "TCP".to_string(),
            }],
            env: vec![PodEnv {
                key: "A".to_string(),
                value: "1".to_string(),
            }],
            pull_policy: "Always".to_string(),
            restart_policy: "Always".to_string(),
            pod_type: "web".to_string(),
            image: "nginx".to_string(),
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let store = MemoryPodStore::new();

        let first = store.create_pod(&spec("a")).await.unwrap();
        let second = store.create_pod(&spec("b")).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        let names: Vec<_> = store
            .read_all_pods()
            .await
            .unwrap()
            .into_iter()
            .map(|pod| pod.spec.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let store = MemoryPodStore::new();
        store.create_pod(&spec("a")).await.unwrap();

        let err = store.create_pod(&spec("a")).await.unwrap_err();

        assert!(matches!(err, PodsDbError::DuplicateName(name) if name == "a"));
    }

    #[tokio::test]
    async fn update_replaces_children() {
        let store = MemoryPodStore::new();
        let id = store.create_pod(&spec("a")).await.unwrap();

        let mut updated = spec("a");
        updated.ports.clear();
        updated.env.push(PodEnv {
            key: "B".to_string(),
            value: "2".to_string(),
        });
        let result = store
            .update_pod(&Pod {
                id,
                spec: updated.clone(),
            })
            .await
            .unwrap();

        assert_eq!(result, Some(id));
        assert_eq!(store.read_pod(id).await.unwrap().unwrap().spec, updated);
    }

    #[tokio::test]
    async fn missing_ids_are_reported_as_none() {
        let store = MemoryPodStore::new();

        assert_eq!(store.delete_pod(42).await.unwrap(), None);
        assert_eq!(
            store
                .update_pod(&Pod {
                    id: 42,
                    spec: spec("a")
                })
                .await
                .unwrap(),
            None
        );
        assert!(store.read_pod(42).await.unwrap().is_none());
    }
}
