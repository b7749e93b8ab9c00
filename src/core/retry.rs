//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::{QuillError, Result};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;
const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// First backoff delay, doubled per subsequent attempt.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }

    /// Backoff before retry number `retry` (0-based), capped.
    fn delay(&self, retry: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES)
    }
}

/// Run `action`, retrying transient failures.
///
/// Only errors whose [`QuillError::is_retryable`] holds are retried; a
/// fatal error returns immediately, unwrapped. A server-provided
/// `Retry-After` overrides the computed backoff. When the budget runs out
/// the last error is returned wrapped in [`QuillError::RetryExhausted`]
/// with the total attempt count.
pub async fn execute<T, F, Fut>(policy: RetryPolicy, mut action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if retry >= policy.max_retries {
                    if policy.max_retries == 0 {
                        return Err(err);
                    }
                    return Err(QuillError::RetryExhausted {
                        attempts: retry + 1,
                        source: Box::new(err),
                    });
                }
                let delay = err.retry_after().unwrap_or_else(|| policy.delay(retry));
                tracing::warn!(
                    error = %err,
                    retry = retry + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient backend failure; retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn transient() -> QuillError {
        QuillError::Network("connection reset".to_string())
    }

    fn fatal() -> QuillError {
        QuillError::BackendRejected {
            provider: "openai".to_string(),
            status: 401,
            message: "bad key".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = execute(instant_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute(instant_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(fatal()) }
        })
        .await;
        assert!(matches!(result, Err(QuillError::BackendRejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute(instant_policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        match result.unwrap_err() {
            QuillError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_returns_the_bare_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = execute(instant_policy(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        // Not wrapped: no retrying happened.
        assert!(matches!(result, Err(QuillError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(5), Duration::from_secs(8));
        assert_eq!(policy.delay(30), Duration::from_secs(8));
    }
}
