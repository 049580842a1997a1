use serde::{Deserialize, Serialize};

/// Sentry error tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Sentry DSN used to report errors.
    pub dsn: String,
}
