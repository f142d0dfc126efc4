//! Token-bucket admission control for upstream requests.
//!
//! The bucket refills lazily from elapsed time on every `acquire`; there is no
//! background timer. Backoff after a 429 or a lost response is separate from the
//! bucket and only sleeps.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

/// Upstream budget per API key: 600 requests per minute.
pub const DEFAULT_CAPACITY: u32 = 600;

/// Window over which a full bucket refills.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// First backoff step; doubles per attempt.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff never sleeps longer than this.
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    /// Tokens added per millisecond.
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    /// Create a full bucket of `capacity` tokens refilling over `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        let window_ms = (window.as_secs_f64() * 1000.0).max(1.0);
        Self {
            capacity,
            refill_rate: capacity / window_ms,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
        bucket.tokens = (bucket.tokens + elapsed_ms * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait_ms = {
                let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                ((1.0 - bucket.tokens) / self.refill_rate).ceil().max(1.0) as u64
            };
            debug!(wait_ms, "Rate limit bucket empty, waiting for refill");
            sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    /// Tokens currently in the bucket, after refill.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// `min(2^attempt * 1s, 30s)`
    pub fn backoff_delay(attempt: u32) -> Duration {
        let ms = 2u64
            .checked_pow(attempt)
            .and_then(|factor| factor.checked_mul(INITIAL_BACKOFF_MS))
            .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS));
        Duration::from_millis(ms)
    }

    pub async fn backoff(&self, attempt: u32) {
        sleep(Self::backoff_delay(attempt)).await;
    }
}
