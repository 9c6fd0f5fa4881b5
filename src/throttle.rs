//! Per-chain error accounting and throttle tier derivation
//!
//! Two counters are kept side by side:
//!
//! - a consecutive-error counter that drives the [`ThrottleTier`]; each success
//!   subtracts a fixed reduction instead of resetting it, so isolated failures
//!   decay gradually
//! - a rolling window of error timestamps consumed by the
//!   [`CircuitBreaker`](crate::circuit::CircuitBreaker)
//!
//! The tier is a pure function of the consecutive counter and cannot be set
//! directly.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ThrottleThresholds;
use crate::types::ThrottleTier;

/// Maps a consecutive-error count to a tier
///
/// # Examples
///
/// ```rust
/// use chainwatch::{config::ThrottleThresholds, throttle::tier_for, ThrottleTier};
///
/// let thresholds = ThrottleThresholds::default();
/// assert_eq!(tier_for(2, &thresholds), ThrottleTier::Normal);
/// assert_eq!(tier_for(3, &thresholds), ThrottleTier::Moderate);
/// assert_eq!(tier_for(10, &thresholds), ThrottleTier::Aggressive);
/// ```
pub fn tier_for(consecutive_errors: u32, thresholds: &ThrottleThresholds) -> ThrottleTier {
    if consecutive_errors >= thresholds.aggressive_errors {
        ThrottleTier::Aggressive
    } else if consecutive_errors >= thresholds.moderate_errors {
        ThrottleTier::Moderate
    } else {
        ThrottleTier::Normal
    }
}

/// Error counters for one chain
#[derive(Debug, Clone)]
pub struct ErrorAccountant {
    thresholds: ThrottleThresholds,
    window: Duration,
    consecutive: u32,
    recent: VecDeque<Instant>,
}

impl ErrorAccountant {
    /// Creates an accountant with no recorded errors
    pub fn new(thresholds: ThrottleThresholds, window: Duration) -> Self {
        Self {
            thresholds,
            window,
            consecutive: 0,
            recent: VecDeque::new(),
        }
    }

    /// Records a successful call, decaying the consecutive counter
    pub fn record_success(&mut self) {
        self.consecutive = self
            .consecutive
            .saturating_sub(self.thresholds.success_reduction);
    }

    /// Records a terminal failure at `now`
    pub fn record_error(&mut self, now: Instant) {
        self.consecutive = self.consecutive.saturating_add(1);
        self.recent.push_back(now);
        self.prune(now);
    }

    /// Current tier
    pub fn tier(&self) -> ThrottleTier {
        tier_for(self.consecutive, &self.thresholds)
    }

    /// Current consecutive-error count
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive
    }

    /// Errors recorded within the trailing window ending at `now`
    pub fn errors_in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.recent.len()
    }

    /// Forgets the rolling window; the consecutive counter is unaffected
    pub fn clear_window(&mut self) {
        self.recent.clear();
    }

    /// Returns `true` once the consecutive counter passes the excessive ceiling
    pub fn is_excessive(&self) -> bool {
        self.consecutive > self.thresholds.excessive_errors
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            self.recent.pop_front();
        }
    }
}
