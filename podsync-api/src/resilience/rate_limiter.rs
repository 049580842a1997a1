use podsync_config::shared::RateLimitConfig;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("The rate limit was exceeded, retry later")]
pub struct Throttled;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by all inbound calls.
///
/// A call either takes a token immediately or is rejected; it never waits for one.
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_second: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a full bucket.
    pub fn new(config: &RateLimitConfig) -> RateLimiter {
        let capacity = f64::from(config.burst);

        RateLimiter {
            rate_per_second: config.rate_per_second,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn try_acquire(&self) -> Result<(), Throttled> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return Err(Throttled);
        }
        bucket.tokens -= 1.0;

        Ok(())
    }
}
