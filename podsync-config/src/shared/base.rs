use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A token bucket without capacity admits nothing.
    #[error("`rate_limit.burst` cannot be zero")]
    RateLimitBurstZero,
    /// Refill rate must be a finite, non-negative number.
    #[error("`rate_limit.rate_per_second` must be finite and non-negative, got {0}")]
    InvalidRefillRate(f64),
    /// A breaker that trips on zero failures is always open.
    #[error("`circuit_breaker.failure_threshold` cannot be zero")]
    FailureThresholdZero,
    /// A half-open breaker must let at least one trial call through.
    #[error("`circuit_breaker.half_open_max_calls` cannot be zero")]
    HalfOpenMaxCallsZero,
    /// The cluster client needs a namespace to fall back to.
    #[error("`cluster.default_namespace` cannot be empty")]
    DefaultNamespaceEmpty,
}
