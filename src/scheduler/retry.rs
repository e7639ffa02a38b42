use crate::service::types::ServiceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Deadline for a single attempt; `None` waits indefinitely
    pub attempt_timeout_secs: Option<u64>,
    /// Retry 4xx/validation failures like transient ones
    pub retry_terminal_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            attempt_timeout_secs: Some(30),
            retry_terminal_errors: false,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }
}

/// Successful outcome of [`RetryExecutor::run_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("after {attempts} attempts, last error: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: ServiceError,
    },
    #[error("non-retryable error on attempt {attempt}: {error}")]
    Terminal { attempt: u32, error: ServiceError },
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Terminal { attempt, .. } => *attempt,
            RetryError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn last_error(&self) -> Option<&ServiceError> {
        match self {
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::Terminal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Runs one unit of work with bounded retries and exponential backoff.
///
/// The backoff starts at `initial_backoff_ms` and doubles after every failed
/// attempt. Cancellation interrupts both a running attempt and a backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    pub fn with_cancellation(config: RetryConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn run_with_retry<T, F, Fut>(
        &self,
        label: &str,
        mut action: F,
    ) -> Result<RetryOutcome<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff();
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let attempt_start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                result = self.attempt(action()) => result,
            };
            let duration = attempt_start.elapsed();

            match result {
                Ok(value) => {
                    info!("{} succeeded. Time taken: {:?}", label, duration);
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                Err(error) => {
                    warn!(
                        "{} failed on attempt {} after {:?}: {}",
                        label, attempt, duration, error
                    );

                    if !error.is_transient() && !self.config.retry_terminal_errors {
                        return Err(RetryError::Terminal { attempt, error });
                    }
                    last_error = Some(error);

                    if attempt < max_attempts {
                        debug!("Retrying {} in {:?}", label, backoff);
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => {
                                return Err(RetryError::Cancelled { attempts: attempt });
                            }
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        Err(RetryError::Exhausted {
            attempts: max_attempts,
            last_error: last_error
                .unwrap_or_else(|| ServiceError::Network("no attempt was made".to_string())),
        })
    }

    async fn attempt<T, Fut>(&self, fut: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.config.attempt_timeout() {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(ServiceError::Timeout(limit))),
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(max_attempts: u32, backoff_ms: u64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: backoff_ms,
            attempt_timeout_secs: None,
            retry_terminal_errors: false,
        }
    }

    fn transient() -> ServiceError {
        ServiceError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_kth_attempt_after_backoff() {
        let executor = RetryExecutor::new(config(3, 100));
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let outcome = executor
            .run_with_retry("Create Organization: acme", || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(transient()) } else { Ok("org-1") }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "org-1");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_always_failing_action_stops_at_max_attempts() {
        let executor = RetryExecutor::new(config(3, 5));
        let calls = Arc::new(AtomicU32::new(0));

        let err = executor
            .run_with_retry("Create Project: p", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.last_error(), Some(&transient()));
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_terminal_error_short_circuits() {
        let executor = RetryExecutor::new(config(5, 5));
        let calls = Arc::new(AtomicU32::new(0));

        let err = executor
            .run_with_retry("Create User: u", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::Status {
                        status: 400,
                        body: "invalid".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::Terminal { attempt: 1, .. }));
    }

    #[tokio::test]
    async fn test_terminal_errors_retried_when_configured() {
        let mut cfg = config(4, 1);
        cfg.retry_terminal_errors = true;
        let executor = RetryExecutor::new(cfg);
        let calls = Arc::new(AtomicU32::new(0));

        let err = executor
            .run_with_retry("Create User: u", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ServiceError::MalformedResponse("eof".to_string()))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts(), 4);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let mut cfg = config(2, 1);
        cfg.attempt_timeout_secs = Some(0);
        let executor = RetryExecutor::new(cfg);

        let err = executor
            .run_with_retry("slow", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ServiceError>(())
            })
            .await
            .unwrap_err();

        match err {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last_error, ServiceError::Timeout(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::with_cancellation(config(3, 10_000), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let err = executor
            .run_with_retry("cancelled", || async { Err::<(), _>(transient()) })
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err, RetryError::Cancelled { attempts: 1 });
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = RetryExecutor::with_cancellation(config(3, 1), cancel);
        let calls = Arc::new(AtomicU32::new(0));

        let err = executor
            .run_with_retry("never", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ServiceError>(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, RetryError::Cancelled { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
