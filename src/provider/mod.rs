// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! The RPC provider interface consumed by the monitor
//!
//! The monitor only ever talks to a chain through [`ChainProvider`]. Its wire
//! protocol is opaque: implementors translate their own failures into
//! [`ProviderError`]s classified as transient or structural, and everything
//! else (breaker, rate limits, retries) happens above this trait.
//!
//! This module provides:
//! - [`ChainProvider`] - the async trait the monitor drives
//! - [`AlloyChainProvider`] - an implementation over any alloy `Provider`
//! - [`create_http_provider`] - HTTP client construction with request logging
//! - [`create_ws_provider`] - WebSocket client for new-block subscriptions
//!   (requires the `ws` feature)
//!
//! # Examples
//!
//! ```rust,ignore
//! use alloy_chains::NamedChain;
//! use chainwatch::provider::{create_http_provider, AlloyChainProvider, ProviderConfig};
//!
//! let client = create_http_provider(&ProviderConfig::new(NamedChain::Base, "https://mainnet.base.org"))?;
//! let provider = AlloyChainProvider::new(NamedChain::Base, client);
//! let head = provider.latest_block_number(NamedChain::Base).await?;
//! ```

mod alloy_chain;
mod config;
mod factory;

pub use alloy_chain::AlloyChainProvider;
pub use config::ProviderConfig;
#[cfg(feature = "ws")]
pub use factory::create_ws_provider;
pub use factory::{create_http_provider, RpcProvider};

use alloy_chains::NamedChain;
use alloy_primitives::{Address, BlockNumber};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::{ProviderError, RpcMethod};
use crate::types::{ActivityEvent, BlockRange};

/// Stream of new block numbers from a subscription
///
/// The stream ending means the subscription was lost.
pub type BlockStream = BoxStream<'static, BlockNumber>;

/// Access to one or more chains' RPC endpoints
///
/// Implementations must be cheap to call concurrently; the monitor shares one
/// instance between a chain's scheduler and connection tasks.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current head of `chain`
    async fn latest_block_number(&self, chain: NamedChain) -> Result<BlockNumber, ProviderError>;

    /// Activity involving any of `wallets` within `range`
    async fn wallet_activity(
        &self,
        chain: NamedChain,
        range: BlockRange,
        wallets: &[Address],
    ) -> Result<Vec<ActivityEvent>, ProviderError>;

    /// Subscribes to new block notifications for `chain`
    ///
    /// The default implementation reports the method as unsupported, which
    /// puts the chain straight into polling-only mode.
    async fn subscribe_new_blocks(&self, chain: NamedChain) -> Result<BlockStream, ProviderError> {
        let _ = chain;
        Err(ProviderError::UnsupportedMethod {
            method: RpcMethod::SubscribeNewBlocks,
        })
    }
}
