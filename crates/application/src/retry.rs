//! Bounded retry of whole units of work with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. Each call to `attempt` must start a fresh unit of work.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &'static str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => {
                if tries > 1 {
                    debug!(operation, attempt = tries, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && tries < max_attempts => {
                let delay = policy.delay_after(tries);
                metrics::counter!("unit_of_work_retries_total", "operation" => operation)
                    .increment(1);
                warn!(
                    operation,
                    attempt = tries,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying unit of work"
                );
                sleep(delay).await;
            }
            Err(e) if e.is_retryable() => {
                metrics::counter!("unit_of_work_retries_exhausted_total", "operation" => operation)
                    .increment(1);
                return Err(AppError::RetriesExhausted {
                    attempts: tries,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(35),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(35));
    }

    #[tokio::test]
    async fn conflict_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast(), "test", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AppError::Conflict("busy".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<()> = with_retry(&fast(), "test", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Validation("bad".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_wraps_the_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<()> = with_retry(&fast(), "test", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Conflict("busy".to_string()))
            }
        })
        .await;

        match result {
            Err(AppError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AppError::Conflict(_)));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
