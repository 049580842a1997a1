use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Thresholds of the inbound admission control and the outbound fault isolation.
///
/// These are operational knobs only; changing them never changes what a successful call does.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ResilienceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()
    }
}

/// Token bucket shared by every inbound call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Tokens added per second. Zero disables refill.
    pub rate_per_second: f64,
    /// Bucket capacity, which is also the number of calls admitted back to back.
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.burst == 0 {
            return Err(ValidationError::RateLimitBurstZero);
        }
        if !self.rate_per_second.is_finite() || self.rate_per_second < 0.0 {
            return Err(ValidationError::InvalidRefillRate(self.rate_per_second));
        }

        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 1000.0,
            burst: 1000,
        }
    }
}

/// Circuit breaker settings, applied per outbound dependency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures within [`CircuitBreakerConfig::failure_window_ms`] that open the circuit.
    pub failure_threshold: u32,
    /// Length of the rolling window in which failures are counted.
    pub failure_window_ms: u64,
    /// How long an open circuit rejects calls before letting trial calls through.
    pub cooldown_ms: u64,
    /// Trial calls allowed while half-open. The same number of successes closes the circuit.
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::FailureThresholdZero);
        }
        if self.half_open_max_calls == 0 {
            return Err(ValidationError::HalfOpenMaxCallsZero);
        }

        Ok(())
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_ms: 10_000,
            cooldown_ms: 5_000,
            half_open_max_calls: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ResilienceConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_burst_is_rejected() {
        let config = RateLimitConfig {
            rate_per_second: 10.0,
            burst: 0,
        };

        assert_eq!(config.validate(), Err(ValidationError::RateLimitBurstZero));
    }

    #[test]
    fn negative_refill_rate_is_rejected() {
        let config = RateLimitConfig {
            rate_per_second: -1.0,
            burst: 10,
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidRefillRate(-1.0))
        );
    }

    #[test]
    fn breaker_needs_at_least_one_trial_call() {
        let config = CircuitBreakerConfig {
            half_open_max_calls: 0,
            ..CircuitBreakerConfig::default()
        };

        assert_eq!(config.validate(), Err(ValidationError::HalfOpenMaxCallsZero));
    }
}
