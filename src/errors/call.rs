//! Outcomes of a gated RPC call.

use alloy_chains::NamedChain;

use super::{ProviderError, RpcMethod};

/// Errors returned by [`CallGate::call`](crate::gate::CallGate::call).
///
/// `CircuitOpen` is distinguishable from provider failures so callers can
/// fast-fail without counting it as a new error.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The chain's circuit breaker rejected the call; no RPC was attempted.
    #[error("Circuit open for {chain}, {method} not attempted")]
    CircuitOpen {
        /// The chain whose breaker is open
        chain: NamedChain,
        /// The method that was short-circuited
        method: RpcMethod,
    },

    /// A transient failure persisted through every retry attempt.
    #[error("{method} failed after {attempts} attempts")]
    RetriesExhausted {
        /// The method that failed
        method: RpcMethod,
        /// Number of attempts made, including the first
        attempts: u32,
        /// The last provider error
        #[source]
        source: ProviderError,
    },

    /// A structural failure; not retried.
    #[error("{method} rejected: {source}")]
    Structural {
        /// The method that failed
        method: RpcMethod,
        /// The provider error
        #[source]
        source: ProviderError,
    },
}

impl CallError {
    /// Returns `true` if the breaker short-circuited the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallError::CircuitOpen { .. })
    }

    /// Returns `true` if this failure counts toward the chain's error totals.
    pub fn counts_as_error(&self) -> bool {
        matches!(self, CallError::RetriesExhausted { .. })
    }

    /// The underlying provider error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CallError::CircuitOpen { .. } => None,
            CallError::RetriesExhausted { source, .. } | CallError::Structural { source, .. } => {
                Some(source)
            }
        }
    }
}
