use std::fmt;

use alloy_chains::NamedChain;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// One watched `(chain, wallet)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchEntry {
    /// The chain
    pub chain: NamedChain,
    /// The wallet
    pub wallet: Address,
}

impl WatchEntry {
    /// Creates an entry
    pub fn new(chain: NamedChain, wallet: Address) -> Self {
        Self { chain, wallet }
    }
}

impl fmt::Display for WatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.wallet, self.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let entry = WatchEntry::new(NamedChain::Base, Address::ZERO);
        assert_eq!(
            entry.to_string(),
            "0x0000000000000000000000000000000000000000@base"
        );
    }
}
