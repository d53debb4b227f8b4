//! Retry strategy with exponential backoff for transient store errors.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vaultdump_common::{Error, Result, SecretPath};
use vaultdump_store::{SecretStore, SecretValues};

/// Backoff policy for store requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, counting the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Randomize each delay by +/- 25%.
    pub jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration. At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Toggle jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay that follows failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // +/- 25%
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Runs operations with bounded retry and cooperative cancellation.
pub struct RetryExecutor {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryExecutor {
    /// Create a new retry executor that is never cancelled.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop retrying once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// Transient errors are retried until `max_attempts` attempts have been
    /// made, then `RetriesExhausted` is returned carrying the last error.
    /// Any other error is returned unchanged after the first attempt. When
    /// the cancellation token fires, the in-flight attempt or backoff sleep
    /// is abandoned and `Cancelled` is returned.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                outcome = operation() => outcome,
            };

            let err = match outcome {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.config.max_attempts {
                warn!(attempts = attempt, error = %err, "Giving up after transient failures");
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_attempts = self.config.max_attempts,
                error = %err,
                "Attempt failed. Retrying in {:?}...",
                delay
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Get the cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// A [`SecretStore`] decorator that retries transient failures.
pub struct RetryingStoreClient<S> {
    store: S,
    executor: RetryExecutor,
}

impl<S: SecretStore> RetryingStoreClient<S> {
    /// Wrap `store` with the given policy and cancellation token.
    pub fn new(store: S, config: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            store,
            executor: RetryExecutor::new(config).with_cancellation(cancel),
        }
    }

    /// Get the wrapped store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Get the retry executor.
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for RetryingStoreClient<S> {
    fn name(&self) -> &str {
        self.store.name()
    }

    async fn list_children(&self, path: &SecretPath) -> Result<Vec<SecretPath>> {
        self.executor
            .execute(|| self.store.list_children(path))
            .await
    }

    async fn read_leaf(&self, path: &SecretPath) -> Result<SecretValues> {
        self.executor.execute(|| self.store.read_leaf(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(60))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        // 1 * 10^5 seconds, capped at 10
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let executor = RetryExecutor::default();

        let result: Result<i32> = executor.execute(|| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_on_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::new(fast(3));

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(Error::Transient("Connection reset".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::new(fast(5));

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Permanent("permission denied".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Permanent(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::new(fast(4));

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    let n = count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Transient(format!("failure {}", n + 1)))
                }
            })
            .await;

        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, Error::Transient(ref msg) if msg == "failure 4"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = RetryExecutor::new(fast(3)).with_cancellation(cancel);

        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();
        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let config = RetryConfig::new(100)
            .with_initial_delay(Duration::from_secs(3600))
            .with_jitter(false);
        let executor = RetryExecutor::new(config).with_cancellation(cancel.clone());

        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();
        let trigger = cancel.clone();

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                let trigger = trigger.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    trigger.cancel();
                    Err(Error::Transient("timeout".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
