//! Per-task retry loop with timeout, exponential backoff and cancellation.

use crate::Error;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait after the `attempt`-th failure (1-based): `base_delay * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(cap))
    }
}

#[derive(Debug)]
pub struct RunSuccess<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> RunSuccess<T> {
    pub fn retries_used(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[derive(Debug)]
pub struct RunFailure {
    /// The last error observed.
    pub error: Error,
    pub attempts: u32,
}

impl RunFailure {
    pub fn retries_used(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Drives one remote call to completion.
#[derive(Debug, Clone)]
pub struct RetryingTaskRunner {
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryingTaskRunner {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls `call` up to `max_retries + 1` times.
    ///
    /// Each attempt races the per-attempt timeout; an elapsed timeout counts
    /// as a retryable failure. Errors for which [`Error::is_retryable`] is
    /// false end the loop immediately. Cancelling `cancel` aborts both the
    /// in-flight attempt and any backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        task_id: &str,
        mut call: F,
        cancel: &CancellationToken,
    ) -> std::result::Result<RunSuccess<T>, RunFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let after_ms = self.timeout.as_millis() as u64;
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RunFailure {
                    error: Error::Cancelled,
                    attempts,
                });
            }
            attempts += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RunFailure { error: Error::Cancelled, attempts });
                }
                r = tokio::time::timeout(self.timeout, call()) => match r {
                    Ok(r) => r,
                    Err(_) => Err(Error::Timeout { after_ms }),
                },
            };

            let error = match outcome {
                Ok(value) => return Ok(RunSuccess { value, attempts }),
                Err(e) => e,
            };

            if !error.is_retryable() || attempts >= max_attempts {
                warn!(task_id, attempt = attempts, error = %error, "task attempts exhausted");
                return Err(RunFailure { error, attempts });
            }

            let delay = self.policy.backoff(attempts);
            debug!(
                task_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after backoff"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RunFailure { error: Error::Cancelled, attempts });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
