//! [`ChainProvider`] over an alloy provider
//!
//! Wallet activity is ERC-20 `Transfer` logs: one `eth_getLogs` query with the
//! watched wallets as senders, one with them as recipients.

use alloy_chains::NamedChain;
use alloy_primitives::{Address, BlockNumber};
use alloy_provider::Provider;
use alloy_rpc_types::Log;
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use tracing::debug;

use super::ChainProvider;
#[cfg(feature = "ws")]
use super::BlockStream;
use crate::errors::{ProviderError, RpcMethod};
use crate::events::{Transfer, TransferFilterBuilder};
use crate::transport::classify_transport_error;
use crate::types::{ActivityDetails, ActivityEvent, BlockRange, TransferDirection};

/// A [`ChainProvider`] bound to a single chain's alloy provider
///
/// Calls for any other chain fail with [`ProviderError::UnsupportedChain`].
#[derive(Debug, Clone)]
pub struct AlloyChainProvider<P> {
    chain: NamedChain,
    provider: P,
}

impl<P> AlloyChainProvider<P> {
    /// Wraps `provider`, which must serve `chain`
    pub fn new(chain: NamedChain, provider: P) -> Self {
        Self { chain, provider }
    }

    /// The chain this provider serves
    pub fn chain(&self) -> NamedChain {
        self.chain
    }

    /// The wrapped alloy provider
    pub fn inner(&self) -> &P {
        &self.provider
    }

    fn ensure_chain(&self, chain: NamedChain) -> Result<(), ProviderError> {
        if chain == self.chain {
            Ok(())
        } else {
            Err(ProviderError::UnsupportedChain { chain })
        }
    }
}

#[async_trait]
impl<P> ChainProvider for AlloyChainProvider<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn latest_block_number(&self, chain: NamedChain) -> Result<BlockNumber, ProviderError> {
        self.ensure_chain(chain)?;
        self.provider
            .get_block_number()
            .await
            .map_err(|e| classify_transport_error(RpcMethod::LatestBlockNumber, e))
    }

    async fn wallet_activity(
        &self,
        chain: NamedChain,
        range: BlockRange,
        wallets: &[Address],
    ) -> Result<Vec<ActivityEvent>, ProviderError> {
        self.ensure_chain(chain)?;
        if wallets.is_empty() {
            return Ok(Vec::new());
        }

        let queries = [
            (
                TransferFilterBuilder::new()
                    .with_senders(wallets.iter().copied())
                    .in_range(range)
                    .build(),
                TransferDirection::Outgoing,
            ),
            (
                TransferFilterBuilder::new()
                    .with_recipients(wallets.iter().copied())
                    .in_range(range)
                    .build(),
                TransferDirection::Incoming,
            ),
        ];

        let mut events = Vec::new();
        for (filter, direction) in queries {
            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| classify_transport_error(RpcMethod::WalletActivity, e))?;
            events.extend(
                logs.iter()
                    .filter_map(|log| decode_transfer(self.chain, log, direction)),
            );
        }

        events.sort_by_key(|event| (event.block_number, log_index(event)));
        Ok(events)
    }

    #[cfg(feature = "ws")]
    async fn subscribe_new_blocks(&self, chain: NamedChain) -> Result<BlockStream, ProviderError> {
        use futures::StreamExt;

        self.ensure_chain(chain)?;
        let subscription = self
            .provider
            .subscribe_blocks()
            .await
            .map_err(|e| classify_transport_error(RpcMethod::SubscribeNewBlocks, e))?;
        debug!(chain = %self.chain, "Block subscription established");

        Ok(subscription
            .into_stream()
            .map(|header| header.number)
            .boxed())
    }
}

/// Turns a Transfer log into an activity event for the wallet on `direction`'s side
///
/// ERC-721 transfers share the event signature but index the token id; they
/// fail to decode and are skipped.
fn decode_transfer(
    chain: NamedChain,
    log: &Log,
    direction: TransferDirection,
) -> Option<ActivityEvent> {
    let block_number = log.block_number?;
    let transfer = match Transfer::decode_log(&log.inner) {
        Ok(decoded) => decoded.data,
        Err(e) => {
            debug!(
                chain = %chain,
                block_number,
                token = %log.inner.address,
                error = %e,
                "Skipping undecodable Transfer log"
            );
            return None;
        }
    };

    let wallet = match direction {
        TransferDirection::Outgoing => transfer.from,
        TransferDirection::Incoming => transfer.to,
    };

    Some(ActivityEvent {
        chain,
        block_number,
        wallet,
        details: ActivityDetails::TokenTransfer {
            token: log.inner.address,
            from: transfer.from,
            to: transfer.to,
            value: transfer.value,
            direction,
            tx_hash: log.transaction_hash,
            log_index: log.log_index,
        },
    })
}

fn log_index(event: &ActivityEvent) -> Option<u64> {
    match &event.details {
        ActivityDetails::TokenTransfer { log_index, .. } => *log_index,
        ActivityDetails::Other { .. } => None,
    }
}
