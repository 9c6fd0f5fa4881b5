// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! # chainwatch
//!
//! Multi-chain wallet activity monitor for EVM chains.
//!
//! chainwatch watches a set of `(chain, wallet)` pairs, scans new blocks for
//! their activity and hands what it finds to an [`ActivitySink`](sink::ActivitySink).
//! Each chain scans at its own pace:
//!
//! - **Adaptive throttling**: consecutive RPC failures move a chain between
//!   [`ThrottleTier`]s, shrinking ranges and batches and lengthening delays
//! - **Circuit breaking**: too many errors in a minute open the chain's breaker;
//!   after a cooldown a single probe decides whether it closes
//! - **Stream/poll failover**: a block subscription drives scans when available,
//!   with timed polling as the fallback and polling-only once reconnects run out
//! - **No gaps**: the per-chain cursor only advances past blocks that were
//!   actually processed; a [`ProcessedBlockCache`] avoids repeat work
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use alloy_chains::NamedChain;
//! use alloy_primitives::address;
//! use chainwatch::provider::{create_http_provider, AlloyChainProvider, ProviderConfig};
//! use chainwatch::sink::ChannelSink;
//! use chainwatch::{MonitorBuilder, MonitorConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let chain = NamedChain::Base;
//! let rpc = create_http_provider(&ProviderConfig::new(chain, "https://mainnet.base.org"))?;
//! let (sink, mut activity) = ChannelSink::new(256);
//!
//! let monitor = MonitorBuilder::new(MonitorConfig::default())
//!     .provider(chain, Arc::new(AlloyChainProvider::new(chain, rpc)))
//!     .sink(Arc::new(sink))
//!     .start();
//!
//! monitor
//!     .add_wallet(chain, address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045"))
//!     .await?;
//!
//! while let Some(event) = activity.recv().await {
//!     println!("{} block {}: {:?}", event.wallet, event.block_number, event.details);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module layout
//!
//! - [`monitor`]: public handle and builder
//! - [`scheduler`] / [`connection`]: the two per-chain tasks
//! - [`gate`]: breaker, accounting, rate limiting and retry around every RPC call
//! - [`provider`]: the [`ChainProvider`](provider::ChainProvider) seam and its alloy
//!   implementation
//! - [`config`]: tuning table and builder

// Configuration
pub mod config;

// Errors
pub mod errors;

// Domain types
pub mod types;

// Call protection
pub mod circuit;
pub mod gate;
pub mod rate_limit;
pub mod retry;
pub mod throttle;

// Scanning
pub mod cache;
pub mod planner;
pub mod scheduler;

// Chain access
pub mod connection;
pub mod events;
pub mod provider;
pub mod transport;

// Delivery and the public handle
pub mod monitor;
pub mod sink;

// Binary entry point
pub mod bootstrap;

mod spans;

pub use cache::{CacheStats, ProcessedBlockCache};
pub use circuit::{Admission, CircuitBreaker};
pub use config::{
    BreakerConfig, CacheConfig, ChainOverrides, ConnectionConfig, MonitorConfig,
    MonitorConfigBuilder, PlannerConfig, RateLimitConfig, ScheduleConfig, ThrottleThresholds,
    TierTable,
};
pub use connection::{ConnectionEvent, ConnectionManager};
pub use errors::{
    CallError, ChainwatchError, MonitorError, ProviderError, RpcMethod, SinkError,
};
pub use gate::{CallGate, HealthSnapshot};
pub use monitor::{Monitor, MonitorBuilder};
pub use planner::{RangePlanner, ScanKind};
pub use rate_limit::RpcRateLimiter;
pub use retry::{calculate_backoff, BackoffState, RetryConfig, RetryController};
pub use throttle::{tier_for, ErrorAccountant};
pub use types::{
    ActivityDetails, ActivityEvent, BlockRange, BreakerStatus, ChainStatus, ConnectionMode,
    ThrottleTier, TierSettings, TransferDirection, WatchEntry,
};
