//! Metadata store for pod records.
//!
//! [`PodStore`] is the seam the coordinator writes through; [`pods::PgPodStore`] persists to
//! Postgres and [`memory::MemoryPodStore`] keeps everything in process for the tests.

mod base;
pub mod memory;
pub mod pods;
pub mod utils;

pub use base::*;
