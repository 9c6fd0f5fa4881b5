//! Global rate limiting for RPC calls.
//!
//! Two independent constraints, shared by every chain:
//!
//! - a concurrency gate admitting at most N in-flight calls
//! - a minimum spacing between consecutive latest-block-number calls, the most
//!   frequently issued and cheapest-to-throttle method
//!
//! The spacing constraint delays callers; it never rejects them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::trace;

use crate::config::RateLimitConfig;

/// Global limiter shared by every chain's [`CallGate`](crate::gate::CallGate).
///
/// Cloning is cheap; clones share state.
///
/// # Example
///
/// ```rust,ignore
/// use chainwatch::RpcRateLimiter;
///
/// let limiter = RpcRateLimiter::new(&config.rate_limit);
/// limiter.await_block_number_slot().await;
/// let _permit = limiter.acquire().await;
/// provider.latest_block_number(chain).await?;
/// // permit released here, whatever the outcome
/// ```
#[derive(Clone, Debug)]
pub struct RpcRateLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    spacing: Arc<Mutex<SpacingState>>,
}

/// Bookkeeping for the latest-block-number spacing window.
#[derive(Debug)]
struct SpacingState {
    min_spacing: Duration,
    /// Start time reserved by the most recent caller
    last_reserved: Option<Instant>,
}

impl SpacingState {
    /// Reserves the next slot, returning when the caller may proceed.
    ///
    /// Each caller reserves a distinct slot so concurrent waiters are spread out
    /// rather than released together.
    fn reserve(&mut self, now: Instant) -> Instant {
        let slot = match self.last_reserved {
            Some(last) => (last + self.min_spacing).max(now),
            None => now,
        };
        self.last_reserved = Some(slot);
        slot
    }
}

impl RpcRateLimiter {
    /// Creates a limiter from configuration. A zero concurrency limit is raised to one.
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_concurrent = config.max_concurrent_calls.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            spacing: Arc::new(Mutex::new(SpacingState {
                min_spacing: config.block_number_spacing,
                last_reserved: None,
            })),
        }
    }

    /// Waits for a concurrency slot.
    ///
    /// The slot is released when the returned permit is dropped, so completion,
    /// failure and cancellation all release it. The semaphore is never closed,
    /// so `None` does not occur in practice; callers proceed without a permit.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// Waits until the latest-block-number spacing window has elapsed.
    pub async fn await_block_number_slot(&self) {
        let slot = {
            let mut spacing = self.spacing.lock().await;
            spacing.reserve(Instant::now())
        };

        if slot > Instant::now() {
            trace!(
                wait_ms = (slot - Instant::now()).as_millis() as u64,
                "Delaying latest block number call"
            );
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Configured concurrency limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, spacing_ms: u64) -> RpcRateLimiter {
        RpcRateLimiter::new(&RateLimitConfig {
            max_concurrent_calls: max,
            block_number_spacing: Duration::from_millis(spacing_ms),
        })
    }

    #[tokio::test]
    async fn test_permits_released_on_drop() {
        let limiter = limiter(2, 0);

        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert_eq!(limiter.in_flight(), 2);

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        drop(b);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap_blocks_extra_callers() {
        let limiter = limiter(1, 0);
        let held = limiter.acquire().await;

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_number_spacing_delays_not_rejects() {
        let limiter = limiter(4, 500);
        let start = Instant::now();

        limiter.await_block_number_slot().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.await_block_number_slot().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        limiter.await_block_number_slot().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_measured_from_previous_call() {
        let limiter = limiter(4, 500);

        limiter.await_block_number_slot().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let start = Instant::now();
        limiter.await_block_number_slot().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_zero_limit_raised_to_one() {
        assert_eq!(limiter(0, 0).max_concurrent(), 1);
    }
}
