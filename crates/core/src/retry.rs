//! Bounded retry for network-bound calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff: attempt n sleeps `base_delay * 2^(n-1)`, capped
/// at [`MAX_DELAY`]. `max_attempts` of 1 means no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        (self.base_delay * factor).min(MAX_DELAY)
    }

    /// Runs `operation` until it succeeds or the attempt budget is
    /// spent, returning the last error.
    pub async fn run<T, E, F, Fut>(&self, call: &str, mut operation: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        call,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
