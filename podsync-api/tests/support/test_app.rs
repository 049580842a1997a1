#![allow(dead_code)]

use podsync_api::config::ApiConfig;
use podsync_api::routes::pods::PodInfo;
use podsync_api::startup::run;
use podsync_config::{Environment, load_config};
use podsync_telemetry::metrics::init_metrics_handle;
use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use crate::support::k8s_client::MockK8sClient;
use crate::support::store::TestPodStore;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub k8s_client: Arc<MockK8sClient>,
    pub store: Arc<TestPodStore>,
    server_handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl TestApp {
    pub async fn add_pod(&self, pod: &PodInfo) -> reqwest::Response {
        self.api_client
            .post(format!("{}/v1/pods", &self.address))
            .json(pod)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_pod(&self, pod_id: i64) -> reqwest::Response {
        self.api_client
            .get(format!("{}/v1/pods/{pod_id}", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn update_pod(&self, pod_id: i64, pod: &PodInfo) -> reqwest::Response {
        self.api_client
            .post(format!("{}/v1/pods/{pod_id}", &self.address))
            .json(pod)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_pod(&self, pod_id: i64) -> reqwest::Response {
        self.api_client
            .delete(format!("{}/v1/pods/{pod_id}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_all_pods(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/v1/pods", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn read_pod_status(&self, pod_id: i64) -> reqwest::Response {
        self.api_client
            .get(format!("{}/v1/pods/{pod_id}/status", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_test_app_with(|_| {}).await
}

/// Spawns the api on a random port, backed by an in-memory store and a mock cluster.
pub async fn spawn_test_app_with<F>(configure: F) -> TestApp
where
    F: FnOnce(&mut ApiConfig),
{
    // We set the environment to dev.
    Environment::Dev.set();

    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let mut config = load_config::<ApiConfig>().expect("Failed to read configuration");
    configure(&mut config);

    let k8s_client = MockK8sClient::new();
    let store = TestPodStore::new();
    let metrics_handle = init_metrics_handle().expect("failed to init metrics");

    let server = run(
        config,
        listener,
        store.clone(),
        k8s_client.clone(),
        metrics_handle,
    )
    .await
    .expect("failed to bind address");

    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        k8s_client,
        store,
        server_handle,
    }
}
