//! Default tuning values
//!
//! Centralizes the numbers behind [`MonitorConfig::default`](super::MonitorConfig::default)
//! so they are discoverable in one place.

/// Throttle tier tuples: (block range, batch size, inter-block delay ms, inter-batch pause ms)
pub mod tiers {
    /// Normal tier: healthy provider
    pub const NORMAL: (u64, usize, u64, u64) = (100, 10, 50, 500);
    /// Moderate tier: a few recent failures
    pub const MODERATE: (u64, usize, u64, u64) = (50, 5, 200, 2_000);
    /// Aggressive tier: sustained failures
    pub const AGGRESSIVE: (u64, usize, u64, u64) = (20, 2, 1_000, 5_000);
}

/// Error accounting thresholds
pub mod throttle {
    /// Consecutive errors at which the tier becomes moderate
    pub const MODERATE_ERRORS: u32 = 3;
    /// Consecutive errors at which the tier becomes aggressive
    pub const AGGRESSIVE_ERRORS: u32 = 10;
    /// Consecutive errors above which the breaker is forced open
    pub const EXCESSIVE_ERRORS: u32 = 100;
    /// Amount a single success subtracts from the consecutive counter
    pub const SUCCESS_REDUCTION: u32 = 2;
}

/// Circuit breaker
pub mod breaker {
    /// Errors within the rolling window that trip the breaker
    pub const TRIP_THRESHOLD: usize = 50;
    /// Rolling error window (seconds)
    pub const ERROR_WINDOW_SECS: u64 = 60;
    /// Time the breaker stays open before allowing a probe (seconds)
    pub const COOLDOWN_SECS: u64 = 30 * 60;
}

/// Global rate limiter
pub mod rate_limit {
    /// Maximum simultaneous in-flight RPC calls across all chains
    pub const MAX_CONCURRENT_CALLS: usize = 10;
    /// Minimum spacing between latest-block-number calls (milliseconds)
    pub const BLOCK_NUMBER_SPACING_MS: u64 = 500;
}

/// Retry controller
pub mod retry {
    /// Maximum attempts per call, including the first
    pub const MAX_ATTEMPTS: u32 = 3;
    /// Base backoff delay (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;
    /// Backoff ceiling (milliseconds)
    pub const MAX_DELAY_MS: u64 = 30_000;
    /// Deadline for one attempt (seconds)
    pub const CALL_TIMEOUT_SECS: u64 = 30;
}

/// Block range planner
pub mod planner {
    /// Range used for the first scan after a new wallet is added
    pub const NEW_WALLET_RANGE: u64 = 10;
    /// Range used by manual checks
    pub const MANUAL_RANGE: u64 = 500;
    /// Blocks re-scanned below the cursor (zero trades safety for RPC cost)
    pub const OVERLAP_BLOCKS: u64 = 0;
    /// Follow-up scans that retry a failed block before it is skipped
    pub const FAILED_BLOCK_RETRIES: u32 = 3;
}

/// Processed-block cache
pub mod cache {
    /// Maximum record age (seconds)
    pub const MAX_AGE_SECS: u64 = 60 * 60;
    /// Maximum records per chain
    pub const MAX_ENTRIES_PER_CHAIN: usize = 10_000;
    /// Sweep interval (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;
}

/// Stream connection management
pub mod connection {
    /// Wait for the first block after subscribing (seconds)
    pub const FIRST_BLOCK_TIMEOUT_SECS: u64 = 30;
    /// Silence after which a freshness check is issued (seconds)
    pub const BLOCK_WAIT_SECS: u64 = 60;
    /// Consecutive silent windows before reconnecting
    pub const MAX_SILENT_CHECKS: u32 = 3;
    /// Reconnect backoff base (seconds)
    pub const RECONNECT_BASE_DELAY_SECS: u64 = 5;
    /// Reconnect backoff ceiling (seconds)
    pub const RECONNECT_MAX_DELAY_SECS: u64 = 5 * 60;
    /// Reconnect attempts before settling on polling only
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
    /// Window in which block events are coalesced (milliseconds)
    pub const DEBOUNCE_WINDOW_MS: u64 = 2_000;
}

/// Scan cadence
pub mod schedule {
    /// Timer cadence while a stream is healthy (seconds)
    pub const STREAM_FALLBACK_INTERVAL_SECS: u64 = 60;
    /// Timer cadence while polling (seconds)
    pub const POLLING_INTERVAL_SECS: u64 = 15;
    /// Timer cadence once reconnects are exhausted (seconds)
    pub const POLLING_ONLY_INTERVAL_SECS: u64 = 120;
}

/// Per-chain task channels
pub mod channels {
    /// Queued monitor commands per chain
    pub const COMMAND_CAPACITY: usize = 64;
    /// Queued connection events per chain
    pub const EVENT_CAPACITY: usize = 32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_tuples_shrink_with_severity() {
        assert!(tiers::NORMAL.0 > tiers::MODERATE.0);
        assert!(tiers::MODERATE.0 > tiers::AGGRESSIVE.0);
        assert!(tiers::NORMAL.3 < tiers::MODERATE.3);
        assert!(tiers::MODERATE.3 < tiers::AGGRESSIVE.3);
    }

    #[test]
    fn test_thresholds_are_ordered() {
        assert!(throttle::MODERATE_ERRORS < throttle::AGGRESSIVE_ERRORS);
        assert!(throttle::AGGRESSIVE_ERRORS < throttle::EXCESSIVE_ERRORS);
        // The breaker must be able to trip on the rolling count before the
        // excessive ceiling forces it.
        assert!((breaker::TRIP_THRESHOLD as u32) < throttle::EXCESSIVE_ERRORS);
    }

    #[test]
    fn test_new_wallet_range_is_smallest() {
        assert!(planner::NEW_WALLET_RANGE < tiers::AGGRESSIVE.0);
        assert!(planner::MANUAL_RANGE > tiers::NORMAL.0);
    }
}
