//! Wallet activity discovered while scanning

use alloy_chains::NamedChain;
use alloy_primitives::{Address, BlockNumber, TxHash, U256};
use serde::{Deserialize, Serialize};

/// Direction of a transfer relative to the watched wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// The wallet sent tokens
    Outgoing,
    /// The wallet received tokens
    Incoming,
}

/// Details of a discovered activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityDetails {
    /// An ERC-20 `Transfer` involving the wallet
    TokenTransfer {
        /// Token contract
        token: Address,
        /// Sender
        from: Address,
        /// Recipient
        to: Address,
        /// Raw amount (not adjusted for decimals)
        value: U256,
        /// Direction relative to the watched wallet
        direction: TransferDirection,
        /// Transaction hash, when the provider reports it
        tx_hash: Option<TxHash>,
        /// Log index within the block, when the provider reports it
        log_index: Option<u64>,
    },
    /// Provider-specific activity the monitor forwards unchanged
    Other {
        /// Opaque payload
        payload: serde_json::Value,
    },
}

/// A wallet activity event delivered to the
/// [`ActivitySink`](crate::sink::ActivitySink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Chain the activity happened on
    pub chain: NamedChain,
    /// Block containing the activity
    pub block_number: BlockNumber,
    /// Watched wallet involved
    pub wallet: Address,
    /// What happened
    pub details: ActivityDetails,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let wallet = address!("1111111111111111111111111111111111111111");
        let event = ActivityEvent {
            chain: NamedChain::Base,
            block_number: 42,
            wallet,
            details: ActivityDetails::TokenTransfer {
                token: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                from: wallet,
                to: address!("2222222222222222222222222222222222222222"),
                value: U256::from(1_000u64),
                direction: TransferDirection::Outgoing,
                tx_hash: None,
                log_index: Some(3),
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["details"]["kind"], "token_transfer");
        assert_eq!(json["details"]["direction"], "outgoing");
        assert_eq!(json["block_number"], 42);
    }
}
