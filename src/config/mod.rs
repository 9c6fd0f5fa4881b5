// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration for chainwatch
//!
//! [`MonitorConfig`] is the immutable tuning table consumed by every component:
//! tier tuples, error thresholds, breaker timing, retry backoff, rate limits,
//! range sizes, cache bounds, reconnect schedules and scan cadence. It is built
//! once and injected; nothing reads configuration from globals.
//!
//! # Example: Using defaults
//!
//! ```rust
//! use chainwatch::MonitorConfig;
//!
//! let config = MonitorConfig::default();
//! assert_eq!(config.planner.overlap_blocks, 0);
//! ```
//!
//! # Example: Custom configuration
//!
//! ```rust
//! use chainwatch::MonitorConfigBuilder;
//! use alloy_chains::NamedChain;
//! use std::time::Duration;
//!
//! let config = MonitorConfigBuilder::with_defaults()
//!     .max_concurrent_calls(4)
//!     .breaker_cooldown(Duration::from_secs(600))
//!     .chain_polling_interval(NamedChain::Base, Duration::from_secs(5))
//!     .build();
//! ```
//!
//! # Example: No pacing (tests, premium RPC)
//!
//! ```rust
//! use chainwatch::MonitorConfig;
//!
//! let config = MonitorConfig::minimal();
//! assert!(config.rate_limit.block_number_spacing.is_zero());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use alloy_chains::NamedChain;

use crate::retry::RetryConfig;
use crate::types::{ThrottleTier, TierSettings};

pub mod constants;

/// Pacing tuples for each throttle tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTable {
    /// Settings while healthy
    pub normal: TierSettings,
    /// Settings after a few failures
    pub moderate: TierSettings,
    /// Settings under sustained failures
    pub aggressive: TierSettings,
}

impl TierTable {
    /// Returns the settings for `tier`.
    pub fn settings(&self, tier: ThrottleTier) -> TierSettings {
        match tier {
            ThrottleTier::Normal => self.normal,
            ThrottleTier::Moderate => self.moderate,
            ThrottleTier::Aggressive => self.aggressive,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            normal: TierSettings::from_tuple(constants::tiers::NORMAL),
            moderate: TierSettings::from_tuple(constants::tiers::MODERATE),
            aggressive: TierSettings::from_tuple(constants::tiers::AGGRESSIVE),
        }
    }
}

/// Thresholds used by the [`ErrorAccountant`](crate::throttle::ErrorAccountant)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleThresholds {
    /// Consecutive errors at or above which the tier is moderate
    pub moderate_errors: u32,
    /// Consecutive errors at or above which the tier is aggressive
    pub aggressive_errors: u32,
    /// Consecutive errors above which the breaker is forced open
    pub excessive_errors: u32,
    /// Amount each success subtracts from the consecutive counter
    pub success_reduction: u32,
}

impl Default for ThrottleThresholds {
    fn default() -> Self {
        Self {
            moderate_errors: constants::throttle::MODERATE_ERRORS,
            aggressive_errors: constants::throttle::AGGRESSIVE_ERRORS,
            excessive_errors: constants::throttle::EXCESSIVE_ERRORS,
            success_reduction: constants::throttle::SUCCESS_REDUCTION,
        }
    }
}

/// Circuit breaker timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Errors within `error_window` that trip the breaker
    pub trip_threshold: usize,
    /// Rolling window for counting errors
    pub error_window: Duration,
    /// How long the breaker stays open before a probe is allowed
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip_threshold: constants::breaker::TRIP_THRESHOLD,
            error_window: Duration::from_secs(constants::breaker::ERROR_WINDOW_SECS),
            cooldown: Duration::from_secs(constants::breaker::COOLDOWN_SECS),
        }
    }
}

/// Global rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum in-flight RPC calls across all chains
    pub max_concurrent_calls: usize,
    /// Minimum time between consecutive latest-block-number calls
    pub block_number_spacing: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: constants::rate_limit::MAX_CONCURRENT_CALLS,
            block_number_spacing: Duration::from_millis(
                constants::rate_limit::BLOCK_NUMBER_SPACING_MS,
            ),
        }
    }
}

/// Block range planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Range size for the first scan after a new wallet is added
    pub new_wallet_range: u64,
    /// Range size for manual checks, regardless of tier
    pub manual_range: u64,
    /// Blocks re-scanned below the cursor.
    ///
    /// Zero keeps RPC cost minimal. If a provider returns an incomplete view of
    /// a block at a range boundary, that block is not revisited; raise this to
    /// re-scan a tail of already-confirmed blocks (the processed-block cache
    /// keeps the re-scan cheap while records are retained).
    pub overlap_blocks: u64,
    /// Follow-up scans that retry a failed block before it is skipped.
    ///
    /// A skipped block is logged at `error` and the cursor moves past it.
    pub failed_block_retries: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            new_wallet_range: constants::planner::NEW_WALLET_RANGE,
            manual_range: constants::planner::MANUAL_RANGE,
            overlap_blocks: constants::planner::OVERLAP_BLOCKS,
            failed_block_retries: constants::planner::FAILED_BLOCK_RETRIES,
        }
    }
}

/// Processed-block cache bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Records older than this are swept
    pub max_age: Duration,
    /// Records per chain above which the oldest are evicted
    pub max_entries_per_chain: usize,
    /// How often the sweep runs
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(constants::cache::MAX_AGE_SECS),
            max_entries_per_chain: constants::cache::MAX_ENTRIES_PER_CHAIN,
            sweep_interval: Duration::from_secs(constants::cache::SWEEP_INTERVAL_SECS),
        }
    }
}

/// Stream connection management
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// How long to wait for the first block after subscribing
    pub first_block_timeout: Duration,
    /// Silence after which a freshness check is requested
    pub block_wait: Duration,
    /// Consecutive silent windows that trigger a reconnect
    pub max_silent_checks: u32,
    /// Reconnect backoff base
    pub reconnect_base_delay: Duration,
    /// Reconnect backoff ceiling
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before falling back to polling only
    pub max_reconnect_attempts: u32,
    /// Window in which block notifications are coalesced
    pub debounce_window: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        use constants::connection as c;
        Self {
            first_block_timeout: Duration::from_secs(c::FIRST_BLOCK_TIMEOUT_SECS),
            block_wait: Duration::from_secs(c::BLOCK_WAIT_SECS),
            max_silent_checks: c::MAX_SILENT_CHECKS,
            reconnect_base_delay: Duration::from_secs(c::RECONNECT_BASE_DELAY_SECS),
            reconnect_max_delay: Duration::from_secs(c::RECONNECT_MAX_DELAY_SECS),
            max_reconnect_attempts: c::MAX_RECONNECT_ATTEMPTS,
            debounce_window: Duration::from_millis(c::DEBOUNCE_WINDOW_MS),
        }
    }
}

/// Timer cadence per connection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Timer interval while a stream is healthy
    pub stream_fallback_interval: Duration,
    /// Timer interval while polling
    pub polling_interval: Duration,
    /// Timer interval once the chain is polling only
    pub polling_only_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        use constants::schedule as s;
        Self {
            stream_fallback_interval: Duration::from_secs(s::STREAM_FALLBACK_INTERVAL_SECS),
            polling_interval: Duration::from_secs(s::POLLING_INTERVAL_SECS),
            polling_only_interval: Duration::from_secs(s::POLLING_ONLY_INTERVAL_SECS),
        }
    }
}

/// Chain-specific overrides
///
/// Chains with fast block times or strict providers usually need their own
/// cadence and backfill size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainOverrides {
    /// Override the polling interval for this chain
    pub polling_interval: Option<Duration>,
    /// Override the new-wallet range for this chain
    pub new_wallet_range: Option<u64>,
    /// Override the manual-check range for this chain
    pub manual_range: Option<u64>,
}

/// Immutable tuning table for the monitor
///
/// Use [`MonitorConfigBuilder`] for a fluent API to construct instances.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pacing per throttle tier
    pub tiers: TierTable,
    /// Error thresholds for tiering and forced trips
    pub throttle: ThrottleThresholds,
    /// Circuit breaker timing
    pub breaker: BreakerConfig,
    /// Retry backoff for individual calls
    pub retry: RetryConfig,
    /// Global concurrency and spacing limits
    pub rate_limit: RateLimitConfig,
    /// Range sizes and overlap
    pub planner: PlannerConfig,
    /// Processed-block cache bounds
    pub cache: CacheConfig,
    /// Stream reconnect schedule
    pub connection: ConnectionConfig,
    /// Scan cadence
    pub schedule: ScheduleConfig,
    /// Chain-specific overrides
    pub chain_overrides: HashMap<NamedChain, ChainOverrides>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            throttle: ThrottleThresholds::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            planner: PlannerConfig::default(),
            cache: CacheConfig::default(),
            connection: ConnectionConfig::default(),
            schedule: ScheduleConfig::default(),
            chain_overrides: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Create a config with every pacing delay removed
    ///
    /// Thresholds, range sizes and timeouts keep their defaults; inter-block
    /// delays, batch pauses, retry backoff and call spacing are zero. Suitable
    /// for tests and premium RPC endpoints.
    pub fn minimal() -> Self {
        let unpaced = |s: TierSettings| TierSettings {
            block_delay: Duration::ZERO,
            batch_pause: Duration::ZERO,
            ..s
        };
        let defaults = TierTable::default();

        Self {
            tiers: TierTable {
                normal: unpaced(defaults.normal),
                moderate: unpaced(defaults.moderate),
                aggressive: unpaced(defaults.aggressive),
            },
            retry: RetryConfig {
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                ..RetryConfig::default()
            },
            rate_limit: RateLimitConfig {
                block_number_spacing: Duration::ZERO,
                ..RateLimitConfig::default()
            },
            ..Self::default()
        }
    }

    /// Settings for `tier`
    pub fn tier_settings(&self, tier: ThrottleTier) -> TierSettings {
        self.tiers.settings(tier)
    }

    /// Effective polling interval for a chain
    ///
    /// Returns the chain-specific override if set, otherwise the global value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chainwatch::{ChainOverrides, MonitorConfig};
    /// use alloy_chains::NamedChain;
    /// use std::time::Duration;
    ///
    /// let mut config = MonitorConfig::default();
    /// config.set_chain_override(
    ///     NamedChain::Arbitrum,
    ///     ChainOverrides {
    ///         polling_interval: Some(Duration::from_secs(3)),
    ///         ..Default::default()
    ///     },
    /// );
    ///
    /// assert_eq!(config.get_polling_interval(NamedChain::Arbitrum), Duration::from_secs(3));
    /// assert_eq!(config.get_polling_interval(NamedChain::Mainnet), Duration::from_secs(15));
    /// ```
    pub fn get_polling_interval(&self, chain: NamedChain) -> Duration {
        self.chain_overrides
            .get(&chain)
            .and_then(|c| c.polling_interval)
            .unwrap_or(self.schedule.polling_interval)
    }

    /// Effective new-wallet range for a chain
    pub fn get_new_wallet_range(&self, chain: NamedChain) -> u64 {
        self.chain_overrides
            .get(&chain)
            .and_then(|c| c.new_wallet_range)
            .unwrap_or(self.planner.new_wallet_range)
    }

    /// Effective manual-check range for a chain
    pub fn get_manual_range(&self, chain: NamedChain) -> u64 {
        self.chain_overrides
            .get(&chain)
            .and_then(|c| c.manual_range)
            .unwrap_or(self.planner.manual_range)
    }

    /// Set chain-specific override
    pub fn set_chain_override(&mut self, chain: NamedChain, overrides: ChainOverrides) {
        self.chain_overrides.insert(chain, overrides);
    }
}

/// Builder for [`MonitorConfig`]
///
/// # Example
///
/// ```rust
/// use chainwatch::MonitorConfigBuilder;
/// use std::time::Duration;
///
/// let config = MonitorConfigBuilder::new()
///     .trip_threshold(20)
///     .max_reconnect_attempts(3)
///     .build();
/// assert_eq!(config.breaker.trip_threshold, 20);
/// ```
#[derive(Debug, Clone)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorConfigBuilder {
    /// Create a new builder starting from [`MonitorConfig::minimal`]
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::minimal(),
        }
    }

    /// Start from [`MonitorConfig::default`]
    pub fn with_defaults() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }

    /// Set the settings for one tier
    pub fn tier(mut self, tier: ThrottleTier, settings: TierSettings) -> Self {
        match tier {
            ThrottleTier::Normal => self.config.tiers.normal = settings,
            ThrottleTier::Moderate => self.config.tiers.moderate = settings,
            ThrottleTier::Aggressive => self.config.tiers.aggressive = settings,
        }
        self
    }

    /// Set the error thresholds
    pub fn throttle_thresholds(mut self, thresholds: ThrottleThresholds) -> Self {
        self.config.throttle = thresholds;
        self
    }

    /// Set the rolling-window error count that trips the breaker
    pub fn trip_threshold(mut self, threshold: usize) -> Self {
        self.config.breaker.trip_threshold = threshold;
        self
    }

    /// Set the breaker cooldown
    pub fn breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.breaker.cooldown = cooldown;
        self
    }

    /// Set the retry configuration
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the global in-flight call limit
    pub fn max_concurrent_calls(mut self, max: usize) -> Self {
        self.config.rate_limit.max_concurrent_calls = max;
        self
    }

    /// Set the minimum spacing between latest-block-number calls
    pub fn block_number_spacing(mut self, spacing: Duration) -> Self {
        self.config.rate_limit.block_number_spacing = spacing;
        self
    }

    /// Set the new-wallet range
    pub fn new_wallet_range(mut self, blocks: u64) -> Self {
        self.config.planner.new_wallet_range = blocks;
        self
    }

    /// Set the manual-check range
    pub fn manual_range(mut self, blocks: u64) -> Self {
        self.config.planner.manual_range = blocks;
        self
    }

    /// Set the overlap below the cursor
    pub fn overlap_blocks(mut self, blocks: u64) -> Self {
        self.config.planner.overlap_blocks = blocks;
        self
    }

    /// Set how many follow-up scans retry a failed block
    pub fn failed_block_retries(mut self, retries: u32) -> Self {
        self.config.planner.failed_block_retries = retries;
        self
    }

    /// Set the per-attempt RPC deadline
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.retry.call_timeout = timeout;
        self
    }

    /// Set the processed-block cache bounds
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Set the connection management settings
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.config.connection = connection;
        self
    }

    /// Set the reconnect attempt cap
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.connection.max_reconnect_attempts = attempts;
        self
    }

    /// Set the scan cadence
    pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.config.schedule = schedule;
        self
    }

    /// Set a polling interval for one chain
    pub fn chain_polling_interval(mut self, chain: NamedChain, interval: Duration) -> Self {
        self.config
            .chain_overrides
            .entry(chain)
            .or_default()
            .polling_interval = Some(interval);
        self
    }

    /// Set a new-wallet range for one chain
    pub fn chain_new_wallet_range(mut self, chain: NamedChain, blocks: u64) -> Self {
        self.config
            .chain_overrides
            .entry(chain)
            .or_default()
            .new_wallet_range = Some(blocks);
        self
    }

    /// Build the configuration
    pub fn build(self) -> MonitorConfig {
        self.config
    }
}
