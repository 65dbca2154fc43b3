use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff configuration with jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Compute the delay before retry number `retry` (0-indexed).
    ///
    /// Formula: `min(base_delay * 2^retry, max_delay) + random_jitter(0..base_delay / 4)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_delay = base_ms.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay.as_millis() as u64);
        let jitter_span = base_ms / 4;
        let jitter = if jitter_span > 0 {
            rand::thread_rng().gen_range(0..jitter_span)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Retry an async operation with exponential backoff and jitter.
///
/// - `config`: retry configuration
/// - `classifier`: inspects an error and returns `Retry` or `Abort`
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error if attempts are exhausted
/// or the classifier returns `Abort`.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if classifier(&e) == RetryAction::Abort || attempt >= total_attempts {
                    return Err(e);
                }
                let delay = config.delay_for_retry(attempt - 1);
                tracing::warn!(
                    "Retryable error (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    total_attempts,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
