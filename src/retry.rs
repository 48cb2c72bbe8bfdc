//! Exponential backoff shared by embedding, generation, and judge calls.
//!
//! Transient provider failures (HTTP 429, 5xx, network faults) are retried
//! with `initial * 2^attempt` backoff capped at `max_backoff_ms`; permanent
//! failures return immediately. The attempt count is always finite.

use std::future::Future;
use std::time::Duration;

use decision_twin_core::ProviderError;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Final failure of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted {
    /// Attempts made, including the first.
    pub attempts: u32,
    /// The last error observed.
    pub cause: ProviderError,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff_ms: 4_000,
            max_backoff_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, Exhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(label, attempt, "succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.backoff(attempt - 1);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        ?backoff,
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep(backoff).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(label, attempts = attempt, error = %err, "giving up after retries");
                    } else {
                        debug!(label, error = %err, "permanent error, not retrying");
                    }
                    return Err(Exhausted {
                        attempts: attempt,
                        cause: err,
                    });
                }
            }
        }
    }

    /// `min(initial * 2^retry, max)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(retry))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, 1, 4)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::new(8, 4_000, 120_000);
        assert_eq!(p.backoff(0), Duration::from_millis(4_000));
        assert_eq!(p.backoff(1), Duration::from_millis(8_000));
        assert_eq!(p.backoff(4), Duration::from_millis(64_000));
        assert_eq!(p.backoff(5), Duration::from_millis(120_000));
        assert_eq!(p.backoff(40), Duration::from_millis(120_000));
    }

    #[tokio::test]
    async fn test_transient_errors_stop_at_attempt_cap() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = quick(6)
            .execute("gen", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Transient("HTTP 429".to_string()))
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(err.cause.is_transient());
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = quick(6)
            .execute("gen", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Permanent("HTTP 401".to_string()))
            })
            .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = quick(4)
            .execute("embed", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ProviderError::Transient("HTTP 503".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, 10, 5).max_attempts, 1);
    }
}
