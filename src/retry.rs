//! Retry policy for calls to the AI provider
//!
//! Wraps a single external call and retries it with exponential backoff when
//! the error is classified as retryable (quota/rate limit by default). Any
//! other error propagates on the first occurrence. Backoff waits race against
//! a cancellation token so a shutdown never sits out a long sleep.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{OutreachError, Result};

/// Decides whether an error deserves another attempt
pub type RetryClassifier = fn(&OutreachError) -> bool;

/// Exponential backoff policy, reusable across call sites
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    multiplier: f64,
    ceiling: f64,
    unit: Duration,
    should_retry: RetryClassifier,
}

/// Bookkeeping for one wrapped call
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    last_error: Option<String>,
    next_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts, including the first one
    /// * `multiplier` - Base of the exponential backoff
    /// * `ceiling` - Maximum backoff, in units
    /// * `unit` - Length of one backoff unit
    pub fn new(max_attempts: u32, multiplier: f64, ceiling: f64, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            multiplier,
            ceiling,
            unit,
            should_retry: OutreachError::is_retryable,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.multiplier,
            config.max_backoff,
            config.unit(),
        )
    }

    /// Replace the error classifier
    pub fn with_classifier(mut self, should_retry: RetryClassifier) -> Self {
        self.should_retry = should_retry;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given (1-based) failed attempt:
    /// `min(ceiling, multiplier^attempt)` units.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let units = self.multiplier.powi(exponent).min(self.ceiling).max(0.0);
        Duration::try_from_secs_f64(self.unit.as_secs_f64() * units).unwrap_or(Duration::MAX)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// Returns the original error for non-retryable failures,
    /// [`OutreachError::RetriesExhausted`] when retryable failures use up the
    /// budget, and [`OutreachError::Cancelled`] when `cancel` fires.
    pub async fn call<T, F, Fut>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState {
            attempt: 0,
            last_error: None,
            next_delay: Duration::ZERO,
        };

        loop {
            if cancel.is_cancelled() {
                return Err(OutreachError::Cancelled);
            }

            state.attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if state.attempt > 1 {
                        debug!(
                            "{} succeeded on attempt {}/{}",
                            operation_name, state.attempt, self.max_attempts
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !(self.should_retry)(&error) {
                debug!(
                    "{} failed with non-retryable error: {}",
                    operation_name, error
                );
                return Err(error);
            }

            if state.attempt >= self.max_attempts {
                warn!(
                    "{} exhausted {} attempts, last error: {}",
                    operation_name, state.attempt, error
                );
                return Err(OutreachError::RetriesExhausted {
                    operation: operation_name.to_string(),
                    attempts: state.attempt,
                    source: Box::new(error),
                });
            }

            state.next_delay = self.backoff_delay(state.attempt);
            state.last_error = Some(error.to_string());
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                operation_name,
                state.attempt,
                self.max_attempts,
                state.last_error.as_deref().unwrap_or_default(),
                state.next_delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("{} backoff interrupted by cancellation", operation_name);
                    return Err(OutreachError::Cancelled);
                }
                _ = tokio::time::sleep(state.next_delay) => {}
            }
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("multiplier", &self.multiplier)
            .field("ceiling", &self.ceiling)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
