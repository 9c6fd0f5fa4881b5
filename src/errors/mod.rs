// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for the chainwatch library.
//!
//! Each concern has its own error type:
//! - [`ProviderError`] - failures reported by an RPC provider, classified as
//!   transient or structural
//! - [`CallError`] - the outcome of a gated call (circuit open, retries exhausted,
//!   structural rejection)
//! - [`SinkError`] - failures delivering activity downstream
//! - [`MonitorError`] - failures of the monitor's public handle
//!
//! [`ChainwatchError`] wraps all of them for callers that do not need to
//! distinguish the source.
//!
//! # Examples
//!
//! ```rust
//! use alloy_chains::NamedChain;
//! use chainwatch::{CallError, ChainwatchError, RpcMethod};
//!
//! let err: ChainwatchError = CallError::CircuitOpen {
//!     chain: NamedChain::Base,
//!     method: RpcMethod::WalletActivity,
//! }
//! .into();
//! assert!(matches!(err, ChainwatchError::Call(ref e) if e.is_circuit_open()));
//! ```

mod call;
mod monitor;
mod provider;

pub use call::CallError;
pub use monitor::{MonitorError, SinkError};
pub use provider::{ProviderError, RpcMethod};

/// Unified error type for all chainwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainwatchError {
    /// Error from an RPC provider.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a gated RPC call.
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Error from the activity sink.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Error from the monitor handle.
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),
}
