//! Retry policy for transient oracle transport failures.
//!
//! Backoff is exponential and attempt-indexed: the n-th retry waits
//! `base_delay * 2^(n-1)`. Only errors the caller classifies as transient are
//! retried; anything else returns immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RequestConfig;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

/// Final error of a retried operation.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Last error observed.
    pub error: E,
    /// Attempts made, the first one included.
    pub attempts: u32,
    /// Whether the last error was transient (retries ran out) or not
    /// (returned without retrying).
    pub transient: bool,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before the given retry (1-based). Zero for retry 0.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(retry - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. `op` receives the 0-based attempt index.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let transient = is_transient(&error);
                    if !transient || attempt >= self.max_retries {
                        return Err(Exhausted {
                            error,
                            attempts: attempt + 1,
                            transient,
                        });
                    }

                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        error = %error,
                        retry = attempt,
                        delay_ms = delay.as_millis(),
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl From<&RequestConfig> for RetryPolicy {
    fn from(config: &RequestConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RequestConfig::default())
    }
}
