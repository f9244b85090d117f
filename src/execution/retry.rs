//! Bounded retry with exponential backoff
//!
//! Each attempt runs under a timeout; a timeout counts as a transient
//! failure. Non-transient errors return immediately.

use super::ExecutionError;
use crate::config::ExecutionConfig;
use crate::feed::FeedError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Errors that can be classified for retry
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_transient(&self) -> bool;
    /// The error reported when an attempt times out
    fn timed_out() -> Self;
}

impl Retryable for ExecutionError {
    fn is_transient(&self) -> bool {
        ExecutionError::is_transient(self)
    }

    fn timed_out() -> Self {
        ExecutionError::Timeout
    }
}

impl Retryable for FeedError {
    fn is_transient(&self) -> bool {
        FeedError::is_transient(self)
    }

    fn timed_out() -> Self {
        FeedError::Transient("timed out".into())
    }
}

/// Retry parameters for gateway and feed calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt timeout
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl RetryPolicy {
    /// Create from ExecutionConfig
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }

    /// Run `op`, retrying transient failures with exponential backoff
    pub async fn run<T, E, F, Fut>(&self, name: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        let mut delay = self.initial_backoff;

        loop {
            let result = match timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out()),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        call = name,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                    delay = (delay * 2).min(self.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, ExecutionError> = fast_policy(3)
            .run("submit", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ExecutionError::Transient("503".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), ExecutionError> = fast_policy(2)
            .run("balance", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecutionError::Transient("reset".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), ExecutionError> = fast_policy(5)
            .run("submit", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExecutionError::Authentication("bad key".into()))
            })
            .await;
        assert!(matches!(result, Err(ExecutionError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let result: Result<(), ExecutionError> = fast_policy(1)
            .run("status", || async {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ExecutionError::Timeout)));
    }

    #[tokio::test]
    async fn test_feed_errors_retry() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), FeedError> = fast_policy(1)
            .run("snapshot", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FeedError::NoData("XBTUSDTM".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
