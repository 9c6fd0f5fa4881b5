//! Errors reported by RPC providers.
//!
//! Every provider failure is classified as either *transient* (worth retrying)
//! or *structural* (retrying cannot help). The classification drives the retry
//! controller and the error accountant.

use alloy_chains::NamedChain;

/// The RPC method a call was issued for.
///
/// Used for logging and to apply method-specific rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// `eth_blockNumber` or equivalent.
    LatestBlockNumber,
    /// Log / transaction query over a block range.
    WalletActivity,
    /// New-head subscription.
    SubscribeNewBlocks,
}

impl RpcMethod {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::LatestBlockNumber => "latest_block_number",
            RpcMethod::WalletActivity => "wallet_activity",
            RpcMethod::SubscribeNewBlocks => "subscribe_new_blocks",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors returned by a [`ChainProvider`](crate::provider::ChainProvider).
///
/// # Examples
///
/// ```rust
/// use chainwatch::ProviderError;
///
/// let err = ProviderError::rate_limited("429 Too Many Requests");
/// assert!(err.is_transient());
///
/// let err = ProviderError::bad_request("invalid block range");
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request did not complete in time.
    #[error("RPC request timed out: {details}")]
    Timeout {
        /// Provider-supplied details
        details: String,
    },

    /// The connection was refused, reset or dropped.
    #[error("RPC connection failed: {details}")]
    Connection {
        /// Provider-supplied details
        details: String,
        /// The underlying transport error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider throttled the request.
    #[error("RPC provider rate limit hit: {details}")]
    RateLimited {
        /// Provider-supplied details
        details: String,
    },

    /// The request was malformed or rejected as invalid.
    #[error("Bad RPC request: {details}")]
    BadRequest {
        /// Provider-supplied details
        details: String,
    },

    /// The provider is not configured for this chain.
    #[error("Unsupported chain: {chain}")]
    UnsupportedChain {
        /// The chain that was requested
        chain: NamedChain,
    },

    /// The provider does not implement this method.
    #[error("Unsupported RPC method: {method}")]
    UnsupportedMethod {
        /// The method that was requested
        method: RpcMethod,
    },

    /// The RPC endpoint URL could not be parsed.
    #[error("Invalid RPC URL '{url}': {details}")]
    InvalidUrl {
        /// The URL as configured
        url: String,
        /// Parser details
        details: String,
    },
}

impl ProviderError {
    /// Returns `true` for failures that may succeed on retry: timeouts,
    /// connection errors and provider rate limits.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout { .. }
                | ProviderError::Connection { .. }
                | ProviderError::RateLimited { .. }
        )
    }

    /// Create a `Timeout` error.
    pub fn timeout(details: impl Into<String>) -> Self {
        ProviderError::Timeout {
            details: details.into(),
        }
    }

    /// Create a `Connection` error without an underlying source.
    pub fn connection(details: impl Into<String>) -> Self {
        ProviderError::Connection {
            details: details.into(),
            source: None,
        }
    }

    /// Create a `Connection` error wrapping a transport error.
    pub fn connection_with_source(
        details: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ProviderError::Connection {
            details: details.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `RateLimited` error.
    pub fn rate_limited(details: impl Into<String>) -> Self {
        ProviderError::RateLimited {
            details: details.into(),
        }
    }

    /// Create a `BadRequest` error.
    pub fn bad_request(details: impl Into<String>) -> Self {
        ProviderError::BadRequest {
            details: details.into(),
        }
    }
}
