//! Retry utilities with linear backoff.
//!
//! Control-plane calls are retried a fixed number of times. After the
//! n-th failed attempt (counting from zero) the caller sleeps n backoff
//! units, so a budget of 5 waits 0, 1, 2 and 3 units between attempts.
//! With [`RetryConfig::with_final_backoff`] the last failure sleeps too
//! (4 units here) before the result is returned.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first. Treated as at least one.
    pub budget: u32,
    /// Backoff unit; the wait grows by one unit per failure.
    pub unit: Duration,
    /// Operation name for logging.
    pub operation_name: String,
    /// Sleep after the last failed attempt as well.
    pub final_backoff: bool,
    cancel: Option<CancellationToken>,
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            budget: 5,
            unit: Duration::from_secs(1),
            operation_name: operation_name.into(),
            final_backoff: false,
            cancel: None,
        }
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_final_backoff(mut self) -> Self {
        self.final_backoff = true;
        self
    }

    /// Abort attempts and backoff sleeps when `token` fires.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Wait after the zero-based `failed_attempt`.
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        self.unit.saturating_mul(failed_attempt)
    }

    async fn cancelled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Every attempt failed; `error` is the last one.
    Failed { error: E, attempts: u32 },
    /// The cancel token fired before an attempt succeeded.
    Cancelled { attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            RetryResult::Success(_) => None,
            RetryResult::Failed { attempts, .. } | RetryResult::Cancelled { attempts } => {
                Some(*attempts)
            }
        }
    }
}

/// Execute an async operation with linear-backoff retries.
///
/// `operation` receives the zero-based attempt number.
pub async fn retry_linear<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let budget = config.budget.max(1);
    let mut attempt = 0u32;

    loop {
        let result = tokio::select! {
            result = operation(attempt) => result,
            _ = config.cancelled() => return RetryResult::Cancelled { attempts: attempt },
        };

        match result {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if attempt + 1 < budget => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} attempt {}/{} failed, retrying in {:?}: {}",
                    config.operation_name,
                    attempt + 1,
                    budget,
                    delay,
                    e
                );
                attempt += 1;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = config.cancelled() => return RetryResult::Cancelled { attempts: attempt },
                }
            }
            Err(e) => {
                let attempts = attempt + 1;
                if config.final_backoff {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        "{} attempt {}/{} failed, giving up in {:?}: {}",
                        config.operation_name, attempts, budget, delay, e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = config.cancelled() => return RetryResult::Cancelled { attempts },
                    }
                }
                return RetryResult::Failed { error: e, attempts };
            }
        }
    }
}

/// State tracker for a periodic call that may fail for long stretches.
///
/// The first `max_logged_failures` consecutive failures are worth logging;
/// after that one suppression notice is emitted and the rest stay quiet
/// until the next success.
#[derive(Debug)]
pub struct FailureTracker {
    name: String,
    consecutive_failures: u32,
    max_logged_failures: u32,
}

impl FailureTracker {
    pub fn new(name: impl Into<String>, max_logged_failures: u32) -> Self {
        Self {
            name: name.into(),
            consecutive_failures: 0,
            max_logged_failures,
        }
    }

    /// Record a success, resetting the failure streak.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > self.max_logged_failures {
            debug!(
                "{} recovered after {} consecutive failures",
                self.name, self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Record a failure. Returns `true` if it should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            return true;
        }
        if self.consecutive_failures == self.max_logged_failures + 1 {
            warn!(
                "{}: suppressing further failure logs after {} consecutive failures",
                self.name, self.max_logged_failures
            );
        }
        false
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
