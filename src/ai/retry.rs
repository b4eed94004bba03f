use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::Result;

/// Sleep seam so retry timing can be observed without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed backoff with optional jitter, applied to rate-limit errors only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.base_delay;
        }
        let jitter_ms = self.jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        let extra = rand::rng().random_range(0..=jitter_ms);
        self.base_delay + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds, fails with a non-rate-limit error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt < attempts => {
                    let delay = self.delay();
                    tracing::warn!(
                        "Rate limited on attempt {}/{}, retrying in {}s: {}",
                        attempt,
                        attempts,
                        delay.as_secs(),
                        e
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
