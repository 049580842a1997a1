//! Configuration management for podsync services.
//!
//! Provides environment detection, layered configuration loading from YAML files and
//! environment variables, secret handling, and the shared configuration types used by the
//! API service (database connection, resilience thresholds and error tracking).

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
