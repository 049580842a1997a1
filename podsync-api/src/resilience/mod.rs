//! Admission control and fault isolation around the pod coordinator.
//!
//! Inbound calls go through [`chain::ResilientPodService`], which starts or continues a trace,
//! takes a token from the shared [`rate_limiter::RateLimiter`] and runs the command on its own
//! task. Outbound calls go through [`outbound::GuardedK8sClient`] and
//! [`outbound::TracedPodStore`].

pub mod chain;
pub mod circuit_breaker;
pub mod outbound;
pub mod rate_limiter;
pub mod trace;
