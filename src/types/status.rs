//! Snapshots of per-chain monitor state

use alloy_chains::NamedChain;
use alloy_primitives::BlockNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ThrottleTier;

/// How a chain learns about new blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// A live subscription delivers new heads.
    Stream,
    /// Timed polling while a stream is being (re)established.
    #[default]
    Polling,
    /// Reconnects exhausted or unsupported; slow timed polling only.
    PollingOnly,
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionMode::Stream => "stream",
            ConnectionMode::Polling => "polling",
            ConnectionMode::PollingOnly => "polling_only",
        })
    }
}

/// Circuit breaker state as reported in status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    /// Calls pass through
    Closed,
    /// Calls are short-circuited
    Open,
    /// A single probe is allowed
    HalfOpen,
}

impl std::fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BreakerStatus::Closed => "closed",
            BreakerStatus::Open => "open",
            BreakerStatus::HalfOpen => "half_open",
        })
    }
}

/// Point-in-time view of a chain's state.
///
/// Returned by [`Monitor::chain_status`](crate::monitor::Monitor::chain_status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    /// The chain
    pub chain: NamedChain,
    /// Highest block confirmed as processed, with no gaps below it
    pub last_confirmed_block: Option<BlockNumber>,
    /// Current throttle tier
    pub tier: ThrottleTier,
    /// Consecutive-error counter driving the tier
    pub consecutive_errors: u32,
    /// Errors within the trailing window
    pub errors_last_minute: usize,
    /// Circuit breaker state
    pub breaker: BreakerStatus,
    /// When the breaker last tripped
    pub breaker_tripped_at: Option<DateTime<Utc>>,
    /// How new blocks are discovered
    pub connection_mode: ConnectionMode,
    /// When the last scan finished
    pub last_check: Option<DateTime<Utc>>,
    /// Number of watched wallets on this chain
    pub wallets: usize,
}
