//! Provider connection options

use std::time::Duration;

use alloy_chains::NamedChain;

/// Options for building one chain's RPC client
///
/// # Example
///
/// ```rust
/// use alloy_chains::NamedChain;
/// use chainwatch::provider::ProviderConfig;
/// use std::time::Duration;
///
/// let config = ProviderConfig::new(NamedChain::Base, "https://mainnet.base.org")
///     .with_slow_request_threshold(Duration::from_secs(2));
/// assert!(config.logging_enabled);
/// ```
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Chain the endpoint serves
    pub chain: NamedChain,
    /// RPC endpoint URL (`http(s)://` or, with the `ws` feature, `ws(s)://`)
    pub url: String,
    /// Install the request logging layer
    pub logging_enabled: bool,
    /// Log request and response payloads at `trace`
    pub log_payloads: bool,
    /// Warn about requests slower than this
    pub slow_request_threshold: Option<Duration>,
}

impl ProviderConfig {
    /// Create a configuration with request logging enabled
    #[must_use]
    pub fn new(chain: NamedChain, url: impl Into<String>) -> Self {
        Self {
            chain,
            url: url.into(),
            logging_enabled: true,
            log_payloads: false,
            slow_request_threshold: None,
        }
    }

    /// Disable the logging layer
    #[must_use]
    pub fn without_logging(mut self) -> Self {
        self.logging_enabled = false;
        self
    }

    /// Log full payloads
    #[must_use]
    pub fn with_payload_logging(mut self) -> Self {
        self.log_payloads = true;
        self
    }

    /// Warn about slow requests
    #[must_use]
    pub fn with_slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.slow_request_threshold = Some(threshold);
        self
    }

    /// Returns `true` if the URL uses a WebSocket scheme
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.url.starts_with("ws://") || self.url.starts_with("wss://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::new(NamedChain::Mainnet, "https://eth.llamarpc.com");
        assert!(config.logging_enabled);
        assert!(!config.log_payloads);
        assert!(!config.is_websocket());
    }

    #[test]
    fn test_builder_methods() {
        let config = ProviderConfig::new(NamedChain::Base, "wss://base.example/ws")
            .without_logging()
            .with_payload_logging();
        assert!(!config.logging_enabled);
        assert!(config.log_payloads);
        assert!(config.is_websocket());
    }
}
