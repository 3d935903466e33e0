//! Randomized exponential backoff and the timing seams the client sleeps on.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Delay ceiling for the first retry.
pub const BACKOFF_BASE_MS: u64 = 300;
/// Upper bound for any single backoff delay.
pub const BACKOFF_CAP_MS: u64 = 4_000;

/// Upper bound of the backoff delay after the 0-based `attempt`:
/// `min(4000, 300 * 2^attempt)` milliseconds.
pub fn backoff_ceiling_ms(attempt: usize) -> u64 {
    let exp = attempt.min(16) as u32;
    BACKOFF_BASE_MS
        .saturating_mul(1u64 << exp)
        .min(BACKOFF_CAP_MS)
}

/// Picks the delay to wait after `attempt`, uniformly in `[0, ceiling]`.
pub fn backoff_delay(attempt: usize, jitter: &dyn JitterSource) -> Duration {
    let ceiling = backoff_ceiling_ms(attempt);
    Duration::from_millis(jitter.jitter_ms(ceiling).min(ceiling))
}

/// Suspends the current task; used for per-attempt deadlines and backoff.
///
/// Dropping the returned future must disarm whatever it scheduled.
#[async_trait]
pub trait Timer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Timer`] backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of backoff jitter.
pub trait JitterSource: Send + Sync {
    /// Returns a value uniformly distributed in `[0, max_ms]`.
    fn jitter_ms(&self, max_ms: u64) -> u64;
}

/// [`JitterSource`] backed by the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn jitter_ms(&self, max_ms: u64) -> u64 {
        rand::thread_rng().gen_range(0..=max_ms)
    }
}

/// Source of request identifiers for the `x-request-id` header.
pub trait RequestIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// [`RequestIdSource`] producing random UUIDv4 strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidRequestIds;

impl RequestIdSource for UuidRequestIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
