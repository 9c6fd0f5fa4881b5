//! ERC-20 event definitions used to detect wallet activity
//!
//! The `sol!` macro generates `SIGNATURE` and `SIGNATURE_HASH` constants, so
//! filters never hash the signature at runtime:
//!
//! ```rust
//! use alloy_sol_types::SolEvent;
//! use chainwatch::events::Transfer;
//!
//! assert_eq!(Transfer::SIGNATURE, "Transfer(address,address,uint256)");
//! ```

use std::fmt::Debug;

use alloy_sol_types::sol;

sol! {
    /// ERC-20 Transfer event
    ///
    /// Mints have `from = 0x0`, burns have `to = 0x0`. `value` is raw and not
    /// adjusted for decimals.
    event Transfer(address indexed from, address indexed to, uint256 value);
}

impl Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transfer(from: {}, to: {}, value: {})",
            self.from, self.to, self.value
        )
    }
}
