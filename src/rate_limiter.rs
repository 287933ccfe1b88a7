//! Concurrency ceiling and inter-call pacing for AI calls
//!
//! The free Gemini tier tolerates very little parallelism, so by default only
//! one record may have classify/generate calls in flight at a time. Each
//! record also waits a short, cancellable pause before its first call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::RateLimitConfig;
use crate::error::{OutreachError, Result};

/// Semaphore-backed limiter shared by every record in a run
#[derive(Debug, Clone)]
pub struct CallRateLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    delay: Duration,
    stats: Arc<LimiterCounters>,
}

#[derive(Debug, Default)]
struct LimiterCounters {
    total_acquired: AtomicU64,
    total_delay_ms: AtomicU64,
}

/// Holding this keeps one slot of the concurrency ceiling occupied
#[derive(Debug)]
pub struct CallPermit {
    _permit: OwnedSemaphorePermit,
}

/// Statistics about limiter usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    pub max_concurrent: usize,
    pub available: usize,
    pub total_acquired: u64,
    pub total_delay_ms: u64,
}

impl CallRateLimiter {
    /// Create a limiter.
    ///
    /// # Arguments
    /// * `max_concurrent` - Records allowed to have calls in flight at once (min 1)
    /// * `delay` - Pause applied after a slot is acquired, before the calls
    pub fn new(max_concurrent: usize, delay: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            delay,
            stats: Arc::new(LimiterCounters::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_concurrent, config.api_delay())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait for a free slot, then for the inter-call delay.
    ///
    /// Both waits end early with [`OutreachError::Cancelled`] when `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<CallPermit> {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(OutreachError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.map_err(|e| {
                OutreachError::ConfigError(format!("Rate limiter closed: {}", e))
            })?,
        };

        if !self.delay.is_zero() {
            trace!("Pacing next call by {:?}", self.delay);
            tokio::select! {
                _ = cancel.cancelled() => return Err(OutreachError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        self.stats.total_acquired.fetch_add(1, Ordering::Relaxed);
        let delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX);
        self.stats
            .total_delay_ms
            .fetch_add(delay_ms, Ordering::Relaxed);

        Ok(CallPermit { _permit: permit })
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            max_concurrent: self.max_concurrent,
            available: self.semaphore.available_permits(),
            total_acquired: self.stats.total_acquired.load(Ordering::Relaxed),
            total_delay_ms: self.stats.total_delay_ms.load(Ordering::Relaxed),
        }
    }
}

impl Default for CallRateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_immediate() {
        let limiter = CallRateLimiter::new(2, Duration::ZERO);
        let cancel = CancellationToken::new();

        let _permit = limiter.acquire(&cancel).await.unwrap();

        let stats = limiter.stats();
        assert_eq!(stats.total_acquired, 1);
        assert_eq!(stats.available, 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let limiter = CallRateLimiter::new(0, Duration::ZERO);
        assert_eq!(limiter.max_concurrent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_applies_delay() {
        let limiter = CallRateLimiter::new(1, Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        let _permit = limiter.acquire(&cancel).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(limiter.stats().total_delay_ms, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_blocks_second_caller() {
        let limiter = CallRateLimiter::new(1, Duration::ZERO);
        let cancel = CancellationToken::new();

        let first = limiter.acquire(&cancel).await.unwrap();

        // Second acquire cannot complete while the first permit is held
        let pending = tokio::time::timeout(Duration::from_millis(50), limiter.acquire(&cancel)).await;
        assert!(pending.is_err());

        drop(first);
        let second = limiter.acquire(&cancel).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_slot() {
        let limiter = CallRateLimiter::new(1, Duration::ZERO);
        let cancel = CancellationToken::new();

        let _held = limiter.acquire(&cancel).await.unwrap();
        cancel.cancel();

        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(OutreachError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_delay() {
        let limiter = CallRateLimiter::new(1, Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let result = limiter.acquire(&cancel).await;

        assert!(matches!(result, Err(OutreachError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(30));
        // Slot is released again on cancellation
        assert_eq!(limiter.stats().available, 1);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let limiter1 = CallRateLimiter::new(3, Duration::ZERO);
        let limiter2 = limiter1.clone();
        let cancel = CancellationToken::new();

        let _permit = limiter1.acquire(&cancel).await.unwrap();

        let stats = limiter2.stats();
        assert_eq!(stats.total_acquired, 1);
        assert_eq!(stats.available, 2);
    }
}
