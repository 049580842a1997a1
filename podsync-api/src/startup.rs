use std::{net::TcpListener, sync::Arc};

use actix_web::{App, HttpServer, dev::Server, web};
use metrics_exporter_prometheus::PrometheusHandle;
use podsync_config::shared::{IntoConnectOptions, PgConnectionConfig};
use podsync_telemetry::metrics::init_metrics_handle;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::ApiConfig,
    coordinator::PodCoordinator,
    db::{PodStore, pods::PgPodStore},
    k8s::{K8sClient, http::HttpK8sClient},
    metrics::register_metrics,
    resilience::{
        chain::ResilientPodService,
        outbound::{GuardedK8sClient, TracedPodStore},
        rate_limiter::RateLimiter,
    },
    routes::{
        ErrorMessage,
        health_check::health_check,
        metrics::metrics,
        pods::{
            AddPodResponse, AllPod, PodEnvInfo, PodInfo, PodPortInfo, PodResponse,
            PodStatusResponse, WorkloadPhaseInfo, add_pod, delete_pod, find_all_pods,
            find_pod_by_id, get_pod_status, update_pod,
        },
    },
    span_builder::ApiRootSpanBuilder,
};

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(config: ApiConfig) -> Result<Self, anyhow::Error> {
        config.validate()?;

        // kube and sqlx both use rustls; only one process wide provider can be installed.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let connection_pool = get_connection_pool(&config.database);

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let k8s_client = HttpK8sClient::new(&config.cluster).await?;
        let metrics_handle = init_metrics_handle()?;

        let server = run(
            config,
            listener,
            Arc::new(PgPodStore::new(connection_pool)),
            Arc::new(k8s_client),
            metrics_handle,
        )
        .await?;

        Ok(Self { port, server })
    }

    pub async fn migrate_database(config: PgConnectionConfig) -> Result<(), anyhow::Error> {
        let connection_pool = get_connection_pool(&config);

        sqlx::migrate!("./migrations").run(&connection_pool).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn get_connection_pool(config: &PgConnectionConfig) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(config.with_db())
}

/// Wires the resilience chain around the given backends and starts the HTTP server.
///
/// The backends are passed in so tests can substitute in-memory and scripted implementations.
pub async fn run(
    config: ApiConfig,
    listener: TcpListener,
    pod_store: Arc<dyn PodStore>,
    k8s_client: Arc<dyn K8sClient>,
    metrics_handle: PrometheusHandle,
) -> Result<Server, anyhow::Error> {
    register_metrics();

    info!(
        application = %config.application,
        default_namespace = config.cluster.default_namespace,
        rate_per_second = config.resilience.rate_limit.rate_per_second,
        burst = config.resilience.rate_limit.burst,
        failure_threshold = config.resilience.circuit_breaker.failure_threshold,
        "starting pod api"
    );

    let k8s_client = Arc::new(GuardedK8sClient::new(
        k8s_client,
        config.resilience.circuit_breaker.clone(),
    ));
    let pod_store = Arc::new(TracedPodStore::new(pod_store));
    let rate_limiter = Arc::new(RateLimiter::new(&config.resilience.rate_limit));
    let service = web::Data::new(ResilientPodService::new(
        PodCoordinator::new(k8s_client, pod_store),
        rate_limiter,
    ));

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::routes::health_check::health_check,
            crate::routes::metrics::metrics,
            crate::routes::pods::add_pod,
            crate::routes::pods::delete_pod,
            crate::routes::pods::update_pod,
            crate::routes::pods::find_pod_by_id,
            crate::routes::pods::find_all_pods,
            crate::routes::pods::get_pod_status,
        ),
        components(schemas(
            ErrorMessage,
            PodInfo,
            PodPortInfo,
            PodEnvInfo,
            AddPodResponse,
            PodResponse,
            AllPod,
            PodStatusResponse,
            WorkloadPhaseInfo,
        ))
    )]
    struct ApiDoc;

    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let tracing_logger = TracingLogger::<ApiRootSpanBuilder>::new();
        App::new()
            .wrap(
                sentry::integrations::actix::Sentry::builder()
                    .capture_server_errors(true)
                    .start_transaction(true)
                    .finish(),
            )
            .wrap(tracing_logger)
            .service(health_check)
            .service(metrics)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .service(
                web::scope("v1")
                    .service(add_pod)
                    .service(find_all_pods)
                    .service(get_pod_status)
                    .service(find_pod_by_id)
                    .service(update_pod)
                    .service(delete_pod),
            )
            .app_data(service.clone())
            .app_data(web::ThinData(metrics_handle.clone()))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
