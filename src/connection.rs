// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Stream subscription management with polling fallback
//!
//! One [`ConnectionManager`] task runs per chain next to its scheduler. It
//! owns no chain state; it only tells the scheduler what it observed through
//! [`ConnectionEvent`]s:
//!
//! ```text
//!             subscribe ok, first block in time
//!   Polling ─────────────────────────────────────▶ Stream
//!      ▲  ▲                                          │
//!      │  └─── silence x max_silent_checks, ─────────┘
//!      │       stream ended, first block late
//!      │
//!      └── reconnect after base·2^n backoff (bounded attempts)
//!
//!   attempts exhausted, or subscriptions unsupported ──▶ PollingOnly (final)
//! ```
//!
//! A subscription rejected by an open breaker waits out the cooldown and does
//! not use up a reconnect attempt.
//!
//! A failed stream always reports `Polling` before a reconnect is attempted, so
//! the scheduler's timer keeps the chain covered while the stream is down.

use std::sync::Arc;

use alloy_chains::NamedChain;
use alloy_primitives::BlockNumber;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ConnectionConfig;
use crate::errors::{CallError, RpcMethod};
use crate::gate::CallGate;
use crate::provider::{BlockStream, ChainProvider};
use crate::retry::exponential_delay;
use crate::spans;
use crate::types::ConnectionMode;

/// What the connection manager tells the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One or more blocks arrived; carries the highest number seen in the burst
    NewBlocks(BlockNumber),
    /// The stream has been silent for a full wait window
    FreshnessCheck,
    /// The chain's connection mode changed
    ModeChanged(ConnectionMode),
}

/// Why a stream session ended
enum SessionEnd {
    /// Shut down, or the scheduler went away
    Stopped,
    /// The stream failed or went quiet; reconnect
    Lost,
}

/// Per-chain stream lifecycle task
pub struct ConnectionManager {
    chain: NamedChain,
    provider: Arc<dyn ChainProvider>,
    gate: CallGate,
    config: ConnectionConfig,
    events: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
    mode: ConnectionMode,
    reconnect_attempts: u32,
}

impl ConnectionManager {
    /// Creates a manager; the chain starts in polling mode
    pub fn new(
        chain: NamedChain,
        provider: Arc<dyn ChainProvider>,
        gate: CallGate,
        config: ConnectionConfig,
        events: mpsc::Sender<ConnectionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chain,
            provider,
            gate,
            config,
            events,
            cancel,
            mode: ConnectionMode::Polling,
            reconnect_attempts: 0,
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        let span = spans::connection(self.chain);
        tokio::spawn(self.run().instrument(span))
    }

    /// Runs until cancelled, the scheduler goes away, or the chain is
    /// demoted to polling-only
    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let subscribe = self.subscribe();
            let subscribed = if self.reconnect_attempts == 0 {
                subscribe.await
            } else {
                subscribe
                    .instrument(spans::reconnect(self.chain, self.reconnect_attempts))
                    .await
            };

            match subscribed {
                Ok(stream) => {
                    if let SessionEnd::Stopped = self.watch(stream).await {
                        break;
                    }
                }
                Err(CallError::Structural { source, .. }) => {
                    warn!(
                        chain = %self.chain,
                        error = %source,
                        "Block subscriptions unavailable, polling only"
                    );
                    self.set_mode(ConnectionMode::PollingOnly).await;
                    break;
                }
                Err(CallError::CircuitOpen { .. }) => {
                    if !self.set_mode(ConnectionMode::Polling).await {
                        break;
                    }
                    if !self.wait_for_breaker().await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    warn!(chain = %self.chain, error = %err, "Block subscription failed");
                }
            }

            if !self.set_mode(ConnectionMode::Polling).await {
                break;
            }
            if !self.backoff().await {
                break;
            }
        }
        debug!(chain = %self.chain, mode = %self.mode, "Connection manager stopped");
    }

    async fn subscribe(&self) -> Result<BlockStream, CallError> {
        let provider = &self.provider;
        let chain = self.chain;
        self.gate
            .call(RpcMethod::SubscribeNewBlocks, || {
                provider.subscribe_new_blocks(chain)
            })
            .await
    }

    /// Follows one subscription until it stops being useful
    async fn watch(&mut self, mut stream: BlockStream) -> SessionEnd {
        let first = tokio::select! {
            _ = self.cancel.cancelled() => return SessionEnd::Stopped,
            first = tokio::time::timeout(self.config.first_block_timeout, stream.next()) => first,
        };

        let first_block = match first {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!(chain = %self.chain, "Block stream closed before the first block");
                return SessionEnd::Lost;
            }
            Err(_) => {
                warn!(
                    chain = %self.chain,
                    timeout_secs = self.config.first_block_timeout.as_secs(),
                    "No block within first-block timeout, falling back to polling"
                );
                return SessionEnd::Lost;
            }
        };

        info!(chain = %self.chain, block = first_block, "Block stream healthy");
        self.reconnect_attempts = 0;
        if !self.set_mode(ConnectionMode::Stream).await {
            return SessionEnd::Stopped;
        }

        let mut pending = Some(first_block);
        let mut flush_at = Some(Instant::now() + self.config.debounce_window);
        let mut silence_deadline = Instant::now() + self.config.block_wait;
        let mut silent_checks = 0u32;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return SessionEnd::Stopped,

                _ = sleep_or_never(flush_at) => {
                    flush_at = None;
                    if !self.flush(&mut pending).await {
                        return SessionEnd::Stopped;
                    }
                }

                next = stream.next() => match next {
                    Some(block) => {
                        silent_checks = 0;
                        silence_deadline = Instant::now() + self.config.block_wait;
                        pending = Some(pending.map_or(block, |p| p.max(block)));
                        if flush_at.is_none() {
                            flush_at = Some(Instant::now() + self.config.debounce_window);
                        }
                    }
                    None => {
                        warn!(chain = %self.chain, "Block stream ended");
                        return self.end_session(&mut pending).await;
                    }
                },

                _ = sleep_until(silence_deadline) => {
                    silent_checks += 1;
                    debug!(
                        chain = %self.chain,
                        silent_checks,
                        "No block within wait window, requesting freshness check"
                    );
                    if !self.emit(ConnectionEvent::FreshnessCheck).await {
                        return SessionEnd::Stopped;
                    }
                    if silent_checks >= self.config.max_silent_checks.max(1) {
                        warn!(chain = %self.chain, silent_checks, "Block stream silent, reconnecting");
                        return self.end_session(&mut pending).await;
                    }
                    silence_deadline = Instant::now() + self.config.block_wait;
                }
            }
        }
    }

    async fn end_session(&self, pending: &mut Option<BlockNumber>) -> SessionEnd {
        if self.flush(pending).await {
            SessionEnd::Lost
        } else {
            SessionEnd::Stopped
        }
    }

    async fn flush(&self, pending: &mut Option<BlockNumber>) -> bool {
        match pending.take() {
            Some(block) => self.emit(ConnectionEvent::NewBlocks(block)).await,
            None => true,
        }
    }

    /// Waits until the breaker admits a probe; reconnect attempts are untouched
    async fn wait_for_breaker(&self) -> bool {
        // A probe already in flight has no cooldown left to wait for.
        let delay = self
            .gate
            .remaining_cooldown()
            .unwrap_or(self.config.reconnect_base_delay);
        debug!(
            chain = %self.chain,
            delay_ms = delay.as_millis() as u64,
            "Circuit open, deferring subscription"
        );

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Waits out the next reconnect delay; `false` once reconnecting is over
    async fn backoff(&mut self) -> bool {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            error!(
                chain = %self.chain,
                attempts = self.reconnect_attempts,
                "Reconnect attempts exhausted, chain is now polling only"
            );
            self.set_mode(ConnectionMode::PollingOnly).await;
            return false;
        }

        let delay = exponential_delay(
            self.reconnect_attempts,
            self.config.reconnect_base_delay,
            self.config.reconnect_max_delay,
        );
        self.reconnect_attempts += 1;
        info!(
            chain = %self.chain,
            attempt = self.reconnect_attempts,
            max_attempts = self.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling stream reconnect"
        );

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Records and reports a mode change; `false` if the scheduler is gone
    async fn set_mode(&mut self, mode: ConnectionMode) -> bool {
        if self.mode == mode {
            return true;
        }
        info!(chain = %self.chain, from = %self.mode, to = %mode, "Connection mode changed");
        self.mode = mode;
        self.emit(ConnectionEvent::ModeChanged(mode)).await
    }

    async fn emit(&self, event: ConnectionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

async fn sleep_or_never(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use alloy_primitives::Address;
    use async_trait::async_trait;
    use futures::stream;

    use crate::config::MonitorConfig;
    use crate::errors::ProviderError;
    use crate::rate_limit::RpcRateLimiter;
    use crate::types::{ActivityEvent, BlockRange};

    /// Hands out pre-built streams, then fails
    struct StreamProvider {
        streams: Mutex<Vec<BlockStream>>,
        subscriptions: AtomicU32,
        unsupported: bool,
    }

    impl StreamProvider {
        fn new(streams: Vec<BlockStream>) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(streams),
                subscriptions: AtomicU32::new(0),
                unsupported: false,
            })
        }
    }

    #[async_trait]
    impl ChainProvider for StreamProvider {
        async fn latest_block_number(&self, _: NamedChain) -> Result<BlockNumber, ProviderError> {
            Ok(0)
        }

        async fn wallet_activity(
            &self,
            _: NamedChain,
            _: BlockRange,
            _: &[Address],
        ) -> Result<Vec<ActivityEvent>, ProviderError> {
            Ok(Vec::new())
        }

        async fn subscribe_new_blocks(&self, _: NamedChain) -> Result<BlockStream, ProviderError> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            if self.unsupported {
                return Err(ProviderError::UnsupportedMethod {
                    method: RpcMethod::SubscribeNewBlocks,
                });
            }
            let mut streams = self.streams.lock().unwrap();
            if streams.is_empty() {
                Err(ProviderError::connection("refused"))
            } else {
                Ok(streams.remove(0))
            }
        }
    }

    fn connection_config() -> ConnectionConfig {
        ConnectionConfig {
            first_block_timeout: Duration::from_secs(30),
            block_wait: Duration::from_secs(60),
            max_silent_checks: 2,
            reconnect_base_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(300),
            max_reconnect_attempts: 2,
            debounce_window: Duration::from_millis(500),
        }
    }

    fn manager(
        provider: Arc<dyn ChainProvider>,
        config: ConnectionConfig,
    ) -> (ConnectionManager, mpsc::Receiver<ConnectionEvent>, CancellationToken) {
        let mut monitor_config = MonitorConfig::minimal();
        monitor_config.retry.max_attempts = 1;
        let gate = CallGate::new(
            NamedChain::Base,
            &monitor_config,
            RpcRateLimiter::new(&monitor_config.rate_limit),
        );
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let manager = ConnectionManager::new(
            NamedChain::Base,
            provider,
            gate,
            config,
            tx,
            cancel.clone(),
        );
        (manager, rx, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_goes_straight_to_polling_only() {
        let provider = Arc::new(StreamProvider {
            streams: Mutex::new(Vec::new()),
            subscriptions: AtomicU32::new(0),
            unsupported: true,
        });
        let (manager, mut rx, _cancel) = manager(provider.clone(), connection_config());

        manager.run().await;

        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::ModeChanged(ConnectionMode::PollingOnly))
        );
        assert_eq!(provider.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_debounced() {
        let blocks: BlockStream = stream::iter(vec![10, 11, 12])
            .chain(stream::pending())
            .boxed();
        let provider = StreamProvider::new(vec![blocks]);
        let (manager, mut rx, cancel) = manager(provider, connection_config());
        let handle = manager.spawn();

        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::ModeChanged(ConnectionMode::Stream))
        );
        assert_eq!(rx.recv().await, Some(ConnectionEvent::NewBlocks(12)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_block_timeout_falls_back_and_exhausts() {
        let silent: BlockStream = stream::pending().boxed();
        let provider = StreamProvider::new(vec![silent]);
        let (manager, mut rx, _cancel) = manager(provider.clone(), connection_config());

        let start = Instant::now();
        manager.run().await;

        // Stream never delivered, so the chain was never in stream mode; the
        // two reconnects fail and the chain is demoted.
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::ModeChanged(ConnectionMode::PollingOnly))
        );
        assert!(rx.recv().await.is_none());
        assert_eq!(provider.subscriptions.load(Ordering::SeqCst), 3);
        // first-block timeout, then 5s and 10s backoff
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_requests_freshness_then_reconnects() {
        let blocks: BlockStream = stream::iter(vec![7]).chain(stream::pending()).boxed();
        let provider = StreamProvider::new(vec![blocks]);
        let (manager, mut rx, _cancel) = manager(provider.clone(), connection_config());

        manager.run().await;

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                ConnectionEvent::ModeChanged(ConnectionMode::Stream),
                ConnectionEvent::NewBlocks(7),
                ConnectionEvent::FreshnessCheck,
                ConnectionEvent::FreshnessCheck,
                ConnectionEvent::ModeChanged(ConnectionMode::Polling),
                ConnectionEvent::ModeChanged(ConnectionMode::PollingOnly),
            ]
        );
        // One healthy subscription, then two failed reconnects
        assert_eq!(provider.subscriptions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_during_backoff() {
        let provider = StreamProvider::new(Vec::new());
        let (manager, _rx, cancel) = manager(provider.clone(), connection_config());
        let handle = manager.spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(provider.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_defers_without_using_reconnects() {
        let blocks: BlockStream = stream::iter(vec![3]).chain(stream::pending()).boxed();
        let provider = StreamProvider::new(vec![blocks]);

        let mut monitor_config = MonitorConfig::minimal();
        monitor_config.retry.max_attempts = 1;
        monitor_config.breaker.trip_threshold = 1;
        let gate = CallGate::new(
            NamedChain::Base,
            &monitor_config,
            RpcRateLimiter::new(&monitor_config.rate_limit),
        );
        let tripped: Result<u64, _> = gate
            .call(RpcMethod::LatestBlockNumber, || async {
                Err(ProviderError::connection("reset"))
            })
            .await;
        assert!(tripped.is_err());
        assert!(!gate.is_available());

        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let manager = ConnectionManager::new(
            NamedChain::Base,
            provider.clone(),
            gate,
            connection_config(),
            tx,
            cancel.clone(),
        );
        let start = Instant::now();
        let handle = manager.spawn();

        // Far longer than the two 5s/10s reconnects would take to run out
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::ModeChanged(ConnectionMode::Stream))
        );
        assert!(start.elapsed() >= monitor_config.breaker.cooldown);
        // Rejected subscriptions never reached the provider
        assert_eq!(provider.subscriptions.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
