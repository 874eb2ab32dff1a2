use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::metrics::Metrics;

// ============================================================================
// Exponential Backoff Retry Strategy
// ============================================================================
//
// Retries an async operation with exponential backoff. Errors that report
// themselves as permanent (`IsTransient::is_transient() == false`) stop the
// loop immediately.
//
// Used by the outbox relay around notifier calls.
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// For high-value operations (more retries)
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// For quick failures (fewer retries)
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay that follows `current`, capped at `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::from_millis(((current.as_millis() as f64) * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation failed after all attempts
    Failed { error: E, attempts: u32 },
    /// Operation reported a permanent failure and was not retried
    PermanentFailure { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Named retry loop with optional metrics
pub struct Retry {
    operation: &'static str,
    config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl Retry {
    pub fn new(operation: &'static str, config: RetryConfig) -> Self {
        Self {
            operation,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `operation` until it succeeds, reports a permanent error, or
    /// exhausts `max_attempts`. The closure receives the 1-based attempt.
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display + IsTransient,
    {
        let mut attempt = 0;
        let mut delay = self.config.initial_delay;

        loop {
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_retry_attempt(self.operation, attempt);
            }

            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = self.operation,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    self.record_outcome(true);
                    return RetryResult::Success(result);
                }
                Err(error) => {
                    if !error.is_transient() {
                        tracing::error!(
                            operation = self.operation,
                            error = %error,
                            "Permanent failure detected, not retrying"
                        );
                        self.record_outcome(false);
                        return RetryResult::PermanentFailure { error, attempts: attempt };
                    }

                    if attempt >= self.config.max_attempts {
                        tracing::error!(
                            operation = self.operation,
                            attempt = attempt,
                            error = %error,
                            "Operation failed after all retries"
                        );
                        self.record_outcome(false);
                        return RetryResult::Failed { error, attempts: attempt };
                    }

                    tracing::warn!(
                        operation = self.operation,
                        attempt = attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying after delay"
                    );

                    sleep(delay).await;
                    delay = self.config.next_delay(delay);
                }
            }
        }
    }

    fn record_outcome(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_retry_outcome(self.operation, success);
        }
    }
}
