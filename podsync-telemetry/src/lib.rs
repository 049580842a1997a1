//! Logging and metrics bootstrap shared by podsync binaries and tests.

pub mod metrics;
pub mod tracing;
