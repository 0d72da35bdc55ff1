//! Token-bucket rate limiting for exchange REST calls

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Shared token bucket: `max_per_interval` requests per `interval`.
///
/// Cloning shares the bucket, so one limiter can guard every call a
/// client makes regardless of how many tasks hold it.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    max_per_interval: u32,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(max_per_interval: u32, interval: Duration) -> Self {
        RateLimiter {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: max_per_interval,
                last_refill: Instant::now(),
            })),
            max_per_interval: max_per_interval.max(1),
            interval,
        }
    }

    /// `requests_per_second` over a one-second window
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, Duration::from_secs(1))
    }

    /// Wait until a request slot is available, then consume it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let elapsed = bucket.last_refill.elapsed();
                if elapsed >= self.interval {
                    bucket.tokens = self.max_per_interval;
                    bucket.last_refill = Instant::now();
                }
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    None
                } else {
                    Some(self.interval.saturating_sub(elapsed))
                }
            };

            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay.max(Duration::from_millis(1))).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_limit() {
        let limiter = RateLimiter::per_second(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn blocks_once_exhausted() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        limiter.acquire().await;
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn clones_share_the_bucket() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let clone = limiter.clone();
        limiter.acquire().await;
        clone.acquire().await;
        let bucket = limiter.bucket.lock().await;
        assert_eq!(bucket.tokens, 0);
    }
}
