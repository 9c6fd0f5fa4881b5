//! Semantic filter builder for ERC-20 Transfer logs
//!
//! Indexed Transfer parameters become log topics:
//!
//! - topic0: event signature hash
//! - topic1: `from` (sender)
//! - topic2: `to` (recipient)
//!
//! [`TransferFilterBuilder`] hides that layout. Each position accepts a set of
//! addresses, so one query covers every watched wallet on a chain.
//!
//! ```rust
//! use alloy_primitives::address;
//! use chainwatch::{events::TransferFilterBuilder, BlockRange};
//!
//! let wallet = address!("1111111111111111111111111111111111111111");
//! let outgoing = TransferFilterBuilder::new()
//!     .with_senders([wallet])
//!     .in_range(BlockRange::single(100))
//!     .build();
//! assert_eq!(outgoing.get_from_block(), Some(100));
//! ```

use alloy_primitives::{Address, BlockNumber, B256};
use alloy_rpc_types::Filter;
use alloy_sol_types::SolEvent;

use super::Transfer;
use crate::types::BlockRange;

/// Builder for Transfer event filters
#[derive(Debug, Clone, Default)]
pub struct TransferFilterBuilder {
    from_block: Option<BlockNumber>,
    to_block: Option<BlockNumber>,
    token: Option<Address>,
    senders: Vec<Address>,
    recipients: Vec<Address>,
}

impl TransferFilterBuilder {
    /// Create an unrestricted builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Only transfers of `token`
    pub fn with_token(mut self, token: Address) -> Self {
        self.token = Some(token);
        self
    }

    /// Only transfers sent by one of `senders` (topic1)
    pub fn with_senders(mut self, senders: impl IntoIterator<Item = Address>) -> Self {
        self.senders.extend(senders);
        self
    }

    /// Only transfers received by one of `recipients` (topic2)
    pub fn with_recipients(mut self, recipients: impl IntoIterator<Item = Address>) -> Self {
        self.recipients.extend(recipients);
        self
    }

    /// Restrict to the blocks of `range`
    pub fn in_range(mut self, range: BlockRange) -> Self {
        self.from_block = Some(range.from());
        self.to_block = Some(range.to());
        self
    }

    /// Build the alloy `Filter`
    pub fn build(self) -> Filter {
        let mut filter = Filter::new().event_signature(Transfer::SIGNATURE_HASH);

        if let Some(from) = self.from_block {
            filter = filter.from_block(from);
        }
        if let Some(to) = self.to_block {
            filter = filter.to_block(to);
        }
        if let Some(token) = self.token {
            filter = filter.address(token);
        }
        if !self.senders.is_empty() {
            filter = filter.topic1(address_topics(&self.senders));
        }
        if !self.recipients.is_empty() {
            filter = filter.topic2(address_topics(&self.recipients));
        }

        filter
    }
}

/// Left-pads addresses into 32-byte topic words
fn address_topics(addresses: &[Address]) -> Vec<B256> {
    addresses.iter().map(|address| address.into_word()).collect()
}
