//! Environment-driven entry point for the `chainwatch` binary
//!
//! | Variable | Meaning |
//! |---|---|
//! | `CHAINWATCH_CHAINS` | Comma-separated chain ids (default `8453`) |
//! | `RPC_URL_<CHAIN_ID>` | RPC endpoint per chain; `ws://`/`wss://` with the `ws` feature |
//! | `CHAINWATCH_WALLETS` | Comma-separated wallet addresses |

use std::sync::Arc;

use alloy_chains::NamedChain;
use alloy_primitives::Address;
use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use tracing::info;

use crate::config::MonitorConfig;
use crate::monitor::MonitorBuilder;
use crate::provider::{create_http_provider, AlloyChainProvider, ChainProvider, ProviderConfig};
use crate::sink::TracingSink;

const DEFAULT_CHAINS: &str = "8453";

/// Main entry point for the application.
///
/// Watches every configured wallet on every configured chain until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();

    let chains = parse_chains(
        &dotenvy::var("CHAINWATCH_CHAINS").unwrap_or_else(|_| DEFAULT_CHAINS.to_string()),
    )?;
    let wallets = parse_wallets(
        &dotenvy::var("CHAINWATCH_WALLETS").context("CHAINWATCH_WALLETS must be set")?,
    )?;

    let mut builder = MonitorBuilder::new(MonitorConfig::default()).sink(Arc::new(TracingSink));
    for chain in &chains {
        let key = format!("RPC_URL_{}", *chain as u64);
        let url = dotenvy::var(&key).with_context(|| format!("{key} must be set for {chain}"))?;
        builder = builder.provider(*chain, connect(*chain, &url).await?);
    }
    let monitor = builder.start();

    for chain in &chains {
        for wallet in &wallets {
            monitor.add_wallet(*chain, *wallet).await?;
        }
    }
    info!(chains = chains.len(), wallets = wallets.len(), "Watching wallets");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    monitor.shutdown().await;

    Ok(())
}

async fn connect(chain: NamedChain, url: &str) -> anyhow::Result<Arc<dyn ChainProvider>> {
    let config = ProviderConfig::new(chain, url);

    #[cfg(feature = "ws")]
    if config.is_websocket() {
        let provider = crate::provider::create_ws_provider(&config).await?;
        return Ok(Arc::new(AlloyChainProvider::new(chain, provider)));
    }

    let provider = create_http_provider(&config)?;
    Ok(Arc::new(AlloyChainProvider::new(chain, provider)))
}

fn parse_chains(raw: &str) -> anyhow::Result<Vec<NamedChain>> {
    let mut chains = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id: u64 = id.parse().with_context(|| format!("Invalid chain id '{id}'"))?;
        let chain = NamedChain::try_from(id).map_err(|_| anyhow!("Unsupported chain id {id}"))?;
        if !chains.contains(&chain) {
            chains.push(chain);
        }
    }
    if chains.is_empty() {
        return Err(anyhow!("No chains configured"));
    }
    Ok(chains)
}

fn parse_wallets(raw: &str) -> anyhow::Result<Vec<Address>> {
    let wallets = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Address>()
                .with_context(|| format!("Invalid wallet address '{s}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if wallets.is_empty() {
        return Err(anyhow!("No wallets configured"));
    }
    Ok(wallets)
}
