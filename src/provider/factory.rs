//! Alloy client construction

use alloy_provider::ProviderBuilder;
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_transport::utils::guess_local_url;
use alloy_transport_http::Http;

use super::config::ProviderConfig;
use crate::errors::ProviderError;
use crate::transport::LoggingLayer;

/// Root alloy provider for Ethereum-compatible chains, over HTTP or WebSocket
pub type RpcProvider = alloy_provider::RootProvider;

fn logging_layer(config: &ProviderConfig) -> LoggingLayer {
    let mut layer = LoggingLayer::new(config.chain);
    if config.log_payloads {
        layer = layer.with_payload_logging();
    }
    if let Some(threshold) = config.slow_request_threshold {
        layer = layer.with_slow_threshold(threshold);
    }
    layer
}

/// Create an HTTP provider
///
/// Recommended fillers are disabled; the monitor only reads chain data.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidUrl`] if the URL cannot be parsed.
pub fn create_http_provider(config: &ProviderConfig) -> Result<RpcProvider, ProviderError> {
    let url: url::Url = config
        .url
        .parse()
        .map_err(|e: url::ParseError| ProviderError::InvalidUrl {
            url: config.url.clone(),
            details: e.to_string(),
        })?;

    let is_local = guess_local_url(&url);
    let http = Http::new(url);
    let client = if config.logging_enabled {
        ClientBuilder::default()
            .layer(logging_layer(config))
            .transport(http, is_local)
    } else {
        RpcClient::new(http, is_local)
    };

    Ok(ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_client(client))
}

/// Create a WebSocket provider
///
/// Async because the WebSocket handshake happens here.
///
/// # Errors
///
/// Returns a transient [`ProviderError::Connection`] if the handshake fails.
#[cfg(feature = "ws")]
pub async fn create_ws_provider(config: &ProviderConfig) -> Result<RpcProvider, ProviderError> {
    use alloy_provider::WsConnect;

    let ws = WsConnect::new(config.url.clone());
    let builder = ClientBuilder::default();

    let client = if config.logging_enabled {
        builder.layer(logging_layer(config)).ws(ws).await
    } else {
        builder.ws(ws).await
    }
    .map_err(|e| ProviderError::connection_with_source("WebSocket handshake failed", e))?;

    Ok(ProviderBuilder::new()
        .disable_recommended_fillers()
        .connect_client(client))
}
