// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! The monitor's public handle
//!
//! [`Monitor`] owns the watch list and starts or stops per-chain tasks as
//! wallets come and go. Each watched chain runs two tasks, a
//! [`ChainScheduler`] and a [`ConnectionManager`], under a child of the
//! monitor's cancellation token. Everything else is shared: the global
//! [`RpcRateLimiter`], the [`ProcessedBlockCache`] and its sweeper, and the
//! [`ActivitySink`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use alloy_chains::NamedChain;
//! use alloy_primitives::address;
//! use chainwatch::provider::{create_http_provider, AlloyChainProvider, ProviderConfig};
//! use chainwatch::sink::TracingSink;
//! use chainwatch::{MonitorBuilder, MonitorConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rpc = create_http_provider(&ProviderConfig::new(NamedChain::Base, "https://mainnet.base.org"))?;
//!
//! let monitor = MonitorBuilder::new(MonitorConfig::default())
//!     .provider(NamedChain::Base, Arc::new(AlloyChainProvider::new(NamedChain::Base, rpc)))
//!     .sink(Arc::new(TracingSink))
//!     .start();
//!
//! monitor
//!     .add_wallet(NamedChain::Base, address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045"))
//!     .await?;
//!
//! let status = monitor.chain_status(NamedChain::Base).await?;
//! println!("{} at {:?}", status.chain, status.last_confirmed_block);
//!
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use alloy_chains::NamedChain;
use alloy_primitives::Address;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{CacheStats, ProcessedBlockCache};
use crate::config::constants::channels;
use crate::config::MonitorConfig;
use crate::connection::ConnectionManager;
use crate::errors::MonitorError;
use crate::gate::CallGate;
use crate::planner::ScanKind;
use crate::provider::ChainProvider;
use crate::rate_limit::RpcRateLimiter;
use crate::scheduler::{ChainContext, ChainScheduler, SchedulerCommand};
use crate::sink::{ActivitySink, TracingSink};
use crate::types::{ChainStatus, WatchEntry};

/// Builder for [`Monitor`]
pub struct MonitorBuilder {
    config: MonitorConfig,
    providers: HashMap<NamedChain, Arc<dyn ChainProvider>>,
    sink: Option<Arc<dyn ActivitySink>>,
}

impl MonitorBuilder {
    /// Starts a builder with the given configuration
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            providers: HashMap::new(),
            sink: None,
        }
    }

    /// Registers the RPC provider for a chain
    pub fn provider(mut self, chain: NamedChain, provider: Arc<dyn ChainProvider>) -> Self {
        self.providers.insert(chain, provider);
        self
    }

    /// Sets the activity sink (defaults to [`TracingSink`])
    pub fn sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds the monitor and starts the cache sweeper
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Monitor {
        let config = Arc::new(self.config);
        let cancel = CancellationToken::new();
        let cache = Arc::new(ProcessedBlockCache::new(config.cache));
        let sweeper = cache
            .clone()
            .spawn_sweeper(config.cache.sweep_interval, cancel.child_token());

        info!(
            chains = self.providers.len(),
            max_concurrent_calls = config.rate_limit.max_concurrent_calls,
            "Monitor started"
        );

        Monitor {
            limiter: RpcRateLimiter::new(&config.rate_limit),
            config,
            providers: self.providers,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            cache,
            cancel,
            inner: Mutex::new(MonitorState {
                chains: HashMap::new(),
                history: HashSet::new(),
                sweeper: Some(sweeper),
                shut_down: false,
            }),
        }
    }
}

struct ChainHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
    connection: JoinHandle<()>,
    wallets: BTreeSet<Address>,
}

impl ChainHandle {
    async fn stop(self, chain: NamedChain) {
        self.cancel.cancel();
        if let Err(e) = self.scheduler.await {
            warn!(chain = %chain, error = %e, "Scheduler task ended abnormally");
        }
        if let Err(e) = self.connection.await {
            warn!(chain = %chain, error = %e, "Connection task ended abnormally");
        }
    }
}

struct MonitorState {
    chains: HashMap<NamedChain, ChainHandle>,
    // Every pair ever added; decides whether a wallet is new
    history: HashSet<WatchEntry>,
    sweeper: Option<JoinHandle<()>>,
    shut_down: bool,
}

/// Multi-chain wallet activity monitor
///
/// Created with [`MonitorBuilder`]. All methods take `&self`, so the monitor
/// can be shared behind an `Arc`. Dropping it cancels every task; call
/// [`shutdown`](Self::shutdown) to also wait for them.
pub struct Monitor {
    config: Arc<MonitorConfig>,
    providers: HashMap<NamedChain, Arc<dyn ChainProvider>>,
    sink: Arc<dyn ActivitySink>,
    limiter: RpcRateLimiter,
    cache: Arc<ProcessedBlockCache>,
    cancel: CancellationToken,
    inner: Mutex<MonitorState>,
}

impl Monitor {
    /// Starts watching `wallet` on `chain`
    ///
    /// Starts the chain's tasks if this is its first wallet. A pair that has
    /// never been watched before gets a new-wallet scan; adding a wallet that
    /// is already watched is a no-op.
    pub async fn add_wallet(&self, chain: NamedChain, wallet: Address) -> Result<(), MonitorError> {
        let mut inner = self.inner.lock().await;
        if inner.shut_down {
            return Err(MonitorError::ShutDown);
        }
        let provider = self
            .providers
            .get(&chain)
            .cloned()
            .ok_or(MonitorError::NoProvider { chain })?;

        let new = inner.history.insert(WatchEntry::new(chain, wallet));
        let handle = inner
            .chains
            .entry(chain)
            .or_insert_with(|| self.start_chain(chain, provider));

        if !handle.wallets.insert(wallet) {
            return Ok(());
        }

        handle
            .commands
            .send(SchedulerCommand::AddWallet { wallet, new })
            .await
            .map_err(|_| MonitorError::SchedulerStopped { chain })
    }

    /// Stops watching `wallet` on `chain`
    ///
    /// Removing the chain's last wallet stops its tasks and clears its
    /// processed-block records.
    pub async fn remove_wallet(&self, chain: NamedChain, wallet: Address) -> Result<(), MonitorError> {
        let mut inner = self.inner.lock().await;
        let handle = inner
            .chains
            .get_mut(&chain)
            .ok_or(MonitorError::ChainNotWatched { chain })?;

        if !handle.wallets.remove(&wallet) {
            return Ok(());
        }
        if !handle.wallets.is_empty() {
            return handle
                .commands
                .send(SchedulerCommand::RemoveWallet(wallet))
                .await
                .map_err(|_| MonitorError::SchedulerStopped { chain });
        }

        if let Some(handle) = inner.chains.remove(&chain) {
            handle.stop(chain).await;
            self.cache.clear_chain(chain).await;
            info!(chain = %chain, "Stopped watching chain");
        }
        Ok(())
    }

    /// Requests a manual scan of `chain`
    ///
    /// The scan still passes through the chain's breaker and rate limits.
    pub async fn trigger_check(&self, chain: NamedChain) -> Result<(), MonitorError> {
        let commands = self.commands_for(chain).await?;
        commands
            .send(SchedulerCommand::Trigger(ScanKind::Manual))
            .await
            .map_err(|_| MonitorError::SchedulerStopped { chain })
    }

    /// Returns a snapshot of `chain`'s state
    pub async fn chain_status(&self, chain: NamedChain) -> Result<ChainStatus, MonitorError> {
        let commands = self.commands_for(chain).await?;
        let (responder, response) = oneshot::channel();
        commands
            .send(SchedulerCommand::Status(responder))
            .await
            .map_err(|_| MonitorError::SchedulerStopped { chain })?;
        response
            .await
            .map_err(|_| MonitorError::SchedulerStopped { chain })
    }

    /// Chains with at least one watched wallet
    pub async fn watched_chains(&self) -> Vec<NamedChain> {
        let mut chains: Vec<_> = self.inner.lock().await.chains.keys().copied().collect();
        chains.sort_by_key(|chain| *chain as u64);
        chains
    }

    /// Wallets watched on `chain`, in address order
    pub async fn watched_wallets(&self, chain: NamedChain) -> Vec<Address> {
        self.inner
            .lock()
            .await
            .chains
            .get(&chain)
            .map(|handle| handle.wallets.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every watched pair, ordered by chain id then address
    pub async fn watch_list(&self) -> Vec<WatchEntry> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<_> = inner
            .chains
            .iter()
            .flat_map(|(chain, handle)| {
                handle
                    .wallets
                    .iter()
                    .map(|wallet| WatchEntry::new(*chain, *wallet))
            })
            .collect();
        entries.sort_by_key(|entry| (entry.chain as u64, entry.wallet));
        entries
    }

    /// Processed-block cache statistics
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Cancels every chain and waits for all tasks to finish
    ///
    /// Further [`add_wallet`](Self::add_wallet) calls fail with
    /// [`MonitorError::ShutDown`].
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let mut inner = self.inner.lock().await;
        inner.shut_down = true;
        for (chain, handle) in inner.chains.drain().collect::<Vec<_>>() {
            handle.stop(chain).await;
        }
        if let Some(sweeper) = inner.sweeper.take() {
            if let Err(e) = sweeper.await {
                warn!(error = %e, "Cache sweeper ended abnormally");
            }
        }
        info!("Monitor shut down");
    }

    async fn commands_for(&self, chain: NamedChain) -> Result<mpsc::Sender<SchedulerCommand>, MonitorError> {
        self.inner
            .lock()
            .await
            .chains
            .get(&chain)
            .map(|handle| handle.commands.clone())
            .ok_or(MonitorError::ChainNotWatched { chain })
    }

    fn start_chain(&self, chain: NamedChain, provider: Arc<dyn ChainProvider>) -> ChainHandle {
        let cancel = self.cancel.child_token();
        let gate = CallGate::new(chain, &self.config, self.limiter.clone());
        let (command_tx, command_rx) = mpsc::channel(channels::COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(channels::EVENT_CAPACITY);

        let connection = ConnectionManager::new(
            chain,
            provider.clone(),
            gate.clone(),
            self.config.connection,
            event_tx,
            cancel.clone(),
        )
        .spawn();

        let scheduler = ChainScheduler::new(
            ChainContext {
                chain,
                provider,
                gate,
                cache: self.cache.clone(),
                sink: self.sink.clone(),
                config: self.config.clone(),
                cancel: cancel.clone(),
            },
            command_rx,
            event_rx,
        )
        .spawn();

        info!(chain = %chain, "Watching chain");

        ChainHandle {
            commands: command_tx,
            cancel,
            scheduler,
            connection,
            wallets: BTreeSet::new(),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
