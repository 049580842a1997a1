mod base;
mod connection;
mod resilience;
mod sentry;

pub use base::*;
pub use connection::*;
pub use resilience::*;
pub use sentry::*;
