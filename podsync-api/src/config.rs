use podsync_config::Config;
use podsync_config::shared::{PgConnectionConfig, ResilienceConfig, SentryConfig, ValidationError};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Complete configuration for the pod API service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Metadata store connection configuration.
    pub database: PgConnectionConfig,
    /// Application server settings.
    pub application: ApplicationSettings,
    /// Cluster client settings.
    pub cluster: ClusterSettings,
    /// Rate limiter and circuit breaker thresholds.
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// Optional Sentry configuration for error tracking.
    pub sentry: Option<SentryConfig>,
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.tls.validate()?;
        self.cluster.validate()?;
        self.resilience.validate()
    }
}

impl Config for ApiConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
    /// Address under which the service is announced to clients, when it differs from the bind
    /// address.
    pub registry_address: Option<String>,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)?;
        if let Some(registry_address) = &self.registry_address {
            writeln!(f, "    registry_address: {registry_address}")?;
        }

        Ok(())
    }
}

/// Settings of the Kubernetes client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSettings {
    /// Namespace used for pods that do not name one.
    pub default_namespace: String,
    /// Field manager recorded on server-side apply patches.
    pub field_manager: String,
    /// Upper bound of every request to the API server, compensating deletes included.
    pub request_timeout_ms: u64,
}

impl ClusterSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_namespace.trim().is_empty() {
            return Err(ValidationError::DefaultNamespaceEmpty);
        }

        Ok(())
    }
}
