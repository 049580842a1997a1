use metrics::gauge;
use podsync_config::shared::CircuitBreakerConfig;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::metrics::{DEPENDENCY, PODSYNC_CIRCUIT_STATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("The circuit for {0} is open")]
pub struct CircuitOpen(pub &'static str);

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Failure instants within the rolling window, oldest first. Only tracked while closed.
    failures: VecDeque<Instant>,
    opened_at: Instant,
    trials_in_flight: u32,
    trial_successes: u32,
}

/// Circuit breaker guarding one outbound dependency.
///
/// Closed, it counts failures in a rolling window and opens once `failure_threshold` of them
/// are seen. Open, it rejects every call until `cooldown` has elapsed, then turns half-open and
/// lets `half_open_max_calls` trial calls through. Any failed trial reopens the circuit, and as
/// many successful trials close it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> CircuitBreaker {
        gauge!(PODSYNC_CIRCUIT_STATE, DEPENDENCY => name).set(CircuitState::Closed.as_gauge());

        CircuitBreaker {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: Instant::now(),
                trials_in_flight: 0,
                trial_successes: 0,
            }),
        }
    }

    /// Returns the current state, turning an open circuit half-open if its cooldown is over.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);

        inner.state
    }

    /// Asks for permission to call the dependency.
    ///
    /// The returned permit must be resolved with [`CircuitPermit::record_success`] or
    /// [`CircuitPermit::record_failure`]. A permit dropped unresolved frees its trial slot
    /// without affecting the state.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CircuitOpen> {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(CircuitPermit::new(self, false)),
            CircuitState::HalfOpen if inner.trials_in_flight < self.config.half_open_max_calls => {
                inner.trials_in_flight += 1;
                Ok(CircuitPermit::new(self, true))
            }
            CircuitState::HalfOpen | CircuitState::Open => Err(CircuitOpen(self.name)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && inner.opened_at.elapsed() >= self.config.cooldown()
        {
            inner.trials_in_flight = 0;
            inner.trial_successes = 0;
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();

        if trial && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            inner.trial_successes += 1;

            if inner.trial_successes >= self.config.half_open_max_calls {
                inner.failures.clear();
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => {
                let window = self.config.failure_window();
                while inner
                    .failures
                    .front()
                    .is_some_and(|failed_at| now.duration_since(*failed_at) > window)
                {
                    inner.failures.pop_front();
                }
                inner.failures.push_back(now);

                if inner.failures.len() >= self.config.failure_threshold as usize {
                    inner.failures.clear();
                    inner.opened_at = now;
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.opened_at = now;
                self.transition(&mut inner, CircuitState::Open);
            }
            // Calls admitted before the circuit left the closed state no longer count.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_abandon(&self, trial: bool) {
        let mut inner = self.lock();

        if trial && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;

        match to {
            CircuitState::Open => warn!(dependency = self.name, ?from, "circuit opened"),
            _ => info!(dependency = self.name, ?from, ?to, "circuit state changed"),
        }
        gauge!(PODSYNC_CIRCUIT_STATE, DEPENDENCY => self.name).set(to.as_gauge());
    }
}

/// Permission to make one call through a [`CircuitBreaker`].
#[must_use]
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    resolved: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> CircuitPermit<'a> {
        CircuitPermit {
            breaker,
            trial,
            resolved: false,
        }
    }

    pub fn record_success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.trial);
    }

    pub fn record_failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.on_abandon(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(half_open_max_calls: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 3,
                failure_window_ms: 1_000,
                cooldown_ms: 5_000,
                half_open_max_calls,
            },
        )
    }

    fn fail(breaker: &CircuitBreaker, times: usize) {
        for _ in 0..times {
            breaker.try_acquire().unwrap().record_failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures_in_window() {
        let breaker = breaker(1);

        fail(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire().unwrap_err(), CircuitOpen("test"));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_outside_the_window_are_forgotten() {
        let breaker = breaker(1);

        fail(&breaker, 2);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        fail(&breaker, 2);

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_only_the_trial_calls() {
        let breaker = breaker(2);
        fail(&breaker, 3);

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let first = breaker.try_acquire().unwrap();
        let second = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_err());

        first.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        second.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_the_circuit() {
        let breaker = breaker(1);
        fail(&breaker, 3);
        tokio::time::advance(Duration::from_secs(5)).await;

        breaker.try_acquire().unwrap().record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_frees_its_slot() {
        let breaker = breaker(1);
        fail(&breaker, 3);
        tokio::time::advance(Duration::from_secs(5)).await;

        drop(breaker.try_acquire().unwrap());

        assert!(breaker.try_acquire().is_ok());
    }
}
