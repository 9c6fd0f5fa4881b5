// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Per-chain scan loop
//!
//! A [`ChainScheduler`] owns its chain's state (cursor, connection mode, watched
//! wallets) and is the only thing that mutates it. Work arrives from three
//! places:
//!
//! - [`SchedulerCommand`]s from the [`Monitor`](crate::monitor::Monitor)
//! - [`ConnectionEvent`]s from the chain's connection manager
//! - an interval timer whose period follows the connection mode
//!
//! Scans run inline, so at most one is ever in flight per chain. Triggers that
//! arrive meanwhile are merged into a single follow-up scan.
//!
//! # Scan procedure
//!
//! 1. Skip if the breaker would reject calls
//! 2. Fetch the latest block
//! 3. Retry blocks that failed in earlier scans; a block that keeps failing
//!    is skipped once its retry budget is spent
//! 4. Plan a range starting past the highest block attempted so far
//! 5. Split the range into tier-sized batches
//! 6. For each block not in the processed-block cache, query activity and
//!    publish it; a failed block is recorded and the batch continues
//! 7. At the end of each batch, mark completed blocks in the cache and advance
//!    the cursor to the highest block with no outstanding failure below it

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use alloy_chains::NamedChain;
use alloy_primitives::{Address, BlockNumber};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::cache::ProcessedBlockCache;
use crate::config::MonitorConfig;
use crate::connection::ConnectionEvent;
use crate::errors::{CallError, RpcMethod};
use crate::gate::CallGate;
use crate::planner::{RangePlanner, ScanKind};
use crate::provider::ChainProvider;
use crate::sink::ActivitySink;
use crate::spans;
use crate::types::{BlockRange, ChainStatus, ConnectionMode, ThrottleTier};

/// Requests sent to a chain's scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Start watching a wallet; `new` wallets get a small backfill scan
    AddWallet {
        /// The wallet
        wallet: Address,
        /// No prior history for this chain/wallet pair
        new: bool,
    },
    /// Stop watching a wallet
    RemoveWallet(Address),
    /// Request a scan
    Trigger(ScanKind),
    /// Report a status snapshot
    Status(oneshot::Sender<ChainStatus>),
}

/// Shared collaborators for one chain's tasks
#[derive(Clone)]
pub struct ChainContext {
    /// The chain
    pub chain: NamedChain,
    /// RPC access
    pub provider: Arc<dyn ChainProvider>,
    /// The chain's breaker, accounting and rate limiting
    pub gate: CallGate,
    /// Processed-block cache shared by all chains
    pub cache: Arc<ProcessedBlockCache>,
    /// Destination for discovered activity
    pub sink: Arc<dyn ActivitySink>,
    /// Tuning table
    pub config: Arc<MonitorConfig>,
    /// Cancelled when the chain stops
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct ChainState {
    /// Every block from `first_scanned` up to here is processed or skipped
    last_confirmed: Option<BlockNumber>,
    /// Highest block any scan has attempted
    frontier: Option<BlockNumber>,
    first_scanned: Option<BlockNumber>,
    /// Failed blocks awaiting a retry, with the number of scans that failed them
    failed: BTreeMap<BlockNumber, u32>,
    last_seen_head: Option<BlockNumber>,
    mode: ConnectionMode,
    last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanOutcome {
    Completed,
    UpToDate,
    Skipped,
    CircuitOpen,
    Failed,
    Cancelled,
}

#[derive(Debug, Default)]
struct ScanTally {
    processed: u64,
    cached: u64,
    failed: u64,
    activity: usize,
}

/// The orchestrating loop for one chain
pub struct ChainScheduler {
    ctx: ChainContext,
    planner: RangePlanner,
    commands: mpsc::Receiver<SchedulerCommand>,
    events: Option<mpsc::Receiver<ConnectionEvent>>,
    state: ChainState,
    wallets: BTreeSet<Address>,
    pending: Option<ScanKind>,
    next_tick: Instant,
}

impl ChainScheduler {
    /// Creates a scheduler with no cursor and no wallets
    pub fn new(
        ctx: ChainContext,
        commands: mpsc::Receiver<SchedulerCommand>,
        events: mpsc::Receiver<ConnectionEvent>,
    ) -> Self {
        let planner = RangePlanner::new(ctx.chain, &ctx.config);
        let mut scheduler = Self {
            ctx,
            planner,
            commands,
            events: Some(events),
            state: ChainState::default(),
            wallets: BTreeSet::new(),
            pending: None,
            next_tick: Instant::now(),
        };
        scheduler.reset_timer();
        scheduler
    }

    /// Spawns [`run`](Self::run) on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        let span = spans::chain_scheduler(self.ctx.chain);
        tokio::spawn(self.run().instrument(span))
    }

    /// Runs until cancelled or the command channel closes
    pub async fn run(mut self) {
        info!(chain = %self.ctx.chain, "Chain scheduler started");

        loop {
            if let Some(kind) = self.pending.take() {
                let outcome = self.scan(kind).await;
                trace!(chain = %self.ctx.chain, kind = %kind, outcome = ?outcome, "Scan finished");
                if outcome == ScanOutcome::Cancelled {
                    break;
                }
                self.reset_timer();
                self.poll_inbox();
                continue;
            }

            let events_open = self.events.is_some();
            tokio::select! {
                biased;

                _ = self.ctx.cancel.cancelled() => break,

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                event = recv_event(&mut self.events), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => self.events = None,
                },

                _ = sleep_until(self.next_tick) => {
                    self.request(ScanKind::Regular);
                    self.reset_timer();
                }
            }
        }

        info!(
            chain = %self.ctx.chain,
            last_confirmed_block = ?self.state.last_confirmed,
            "Chain scheduler stopped"
        );
    }

    fn request(&mut self, kind: ScanKind) {
        self.pending = Some(match self.pending {
            Some(existing) => existing.merge(kind),
            None => kind,
        });
    }

    fn interval(&self) -> Duration {
        let schedule = &self.ctx.config.schedule;
        match self.state.mode {
            ConnectionMode::Stream => schedule.stream_fallback_interval,
            ConnectionMode::Polling => self.ctx.config.get_polling_interval(self.ctx.chain),
            ConnectionMode::PollingOnly => schedule.polling_only_interval,
        }
    }

    fn reset_timer(&mut self) {
        self.next_tick = Instant::now() + self.interval();
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::AddWallet { wallet, new } => {
                if self.wallets.insert(wallet) {
                    info!(chain = %self.ctx.chain, wallet = %wallet, new, "Watching wallet");
                    self.request(if new {
                        ScanKind::NewWallet
                    } else {
                        ScanKind::Regular
                    });
                }
            }
            SchedulerCommand::RemoveWallet(wallet) => {
                if self.wallets.remove(&wallet) {
                    info!(chain = %self.ctx.chain, wallet = %wallet, "Stopped watching wallet");
                }
            }
            SchedulerCommand::Trigger(kind) => {
                debug!(chain = %self.ctx.chain, kind = %kind, "Scan requested");
                self.request(kind);
            }
            SchedulerCommand::Status(responder) => {
                if responder.send(self.status()).is_err() {
                    debug!(chain = %self.ctx.chain, "Status requester went away");
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::NewBlocks(block) => {
                self.note_head(block);
                self.request(ScanKind::Regular);
            }
            ConnectionEvent::FreshnessCheck => self.freshness_check().await,
            ConnectionEvent::ModeChanged(mode) => self.set_mode(mode),
        }
    }

    fn set_mode(&mut self, mode: ConnectionMode) {
        if mode == ConnectionMode::PollingOnly {
            warn!(chain = %self.ctx.chain, "Chain degraded to polling only");
        }
        self.state.mode = mode;
        self.reset_timer();
    }

    /// Applies whatever arrived while a scan was running, without waiting
    fn poll_inbox(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        while let Some(events) = self.events.as_mut() {
            match events.try_recv() {
                Ok(ConnectionEvent::NewBlocks(block)) => {
                    self.note_head(block);
                    self.request(ScanKind::Regular);
                }
                // The follow-up scan fetches the head anyway
                Ok(ConnectionEvent::FreshnessCheck) => self.request(ScanKind::Regular),
                Ok(ConnectionEvent::ModeChanged(mode)) => self.set_mode(mode),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.events = None,
            }
        }
    }

    fn note_head(&mut self, block: BlockNumber) {
        self.state.last_seen_head = Some(self.state.last_seen_head.map_or(block, |h| h.max(block)));
    }

    async fn latest_block(&mut self) -> Result<BlockNumber, CallError> {
        let provider = &self.ctx.provider;
        let chain = self.ctx.chain;
        let head = self
            .ctx
            .gate
            .call(RpcMethod::LatestBlockNumber, || {
                provider.latest_block_number(chain)
            })
            .await?;
        self.note_head(head);
        Ok(head)
    }

    async fn freshness_check(&mut self) {
        if self.wallets.is_empty() {
            return;
        }
        let cancel = self.ctx.cancel.clone();
        let span = spans::freshness_check(self.ctx.chain);
        let head = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            head = self.latest_block().instrument(span) => head,
        };

        match head {
            Ok(head) if self.resume_point().is_none_or(|resume| head > resume) => {
                debug!(chain = %self.ctx.chain, head, "Freshness check found new blocks");
                self.request(ScanKind::Regular);
            }
            Ok(head) => trace!(chain = %self.ctx.chain, head, "Freshness check: up to date"),
            Err(e) => debug!(chain = %self.ctx.chain, error = %e, "Freshness check failed"),
        }
    }

    /// Block new ranges are planned from
    fn resume_point(&self) -> Option<BlockNumber> {
        self.state.frontier.max(self.state.last_confirmed)
    }

    async fn scan(&mut self, kind: ScanKind) -> ScanOutcome {
        if self.wallets.is_empty() {
            return ScanOutcome::Skipped;
        }
        if !self.ctx.gate.is_available() {
            debug!(chain = %self.ctx.chain, kind = %kind, "Circuit open, skipping scan");
            return ScanOutcome::CircuitOpen;
        }

        let cancel = self.ctx.cancel.clone();
        let latest = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ScanOutcome::Cancelled,
            latest = self.latest_block() => latest,
        };
        let latest = match latest {
            Ok(latest) => latest,
            Err(e) if e.is_circuit_open() => return ScanOutcome::CircuitOpen,
            Err(e) => {
                debug!(chain = %self.ctx.chain, error = %e, "Could not fetch latest block");
                self.state.last_check = Some(Utc::now());
                return ScanOutcome::Failed;
            }
        };

        let tier = self.ctx.gate.tier();
        if !self.state.failed.is_empty() {
            let outcome = self.retry_failed().await;
            if outcome != ScanOutcome::Completed {
                self.state.last_check = Some(Utc::now());
                return outcome;
            }
        }

        let Some(range) = self.planner.plan(self.resume_point(), latest, tier, kind) else {
            self.state.last_check = Some(Utc::now());
            return ScanOutcome::UpToDate;
        };
        if self.state.first_scanned.is_none() {
            self.state.first_scanned = Some(range.from());
        }

        let span = spans::scan_range(self.ctx.chain, kind, range.from(), range.to());
        let outcome = self.process_range(range, tier).instrument(span).await;
        self.state.last_check = Some(Utc::now());
        outcome
    }

    /// Gives every outstanding failed block one more attempt
    async fn retry_failed(&mut self) -> ScanOutcome {
        let chain = self.ctx.chain;
        let blocks: Vec<BlockNumber> = self.state.failed.keys().copied().collect();
        let mut recovered = Vec::new();
        let mut outcome = ScanOutcome::Completed;

        for block in blocks {
            if self.ctx.cancel.is_cancelled() {
                outcome = ScanOutcome::Cancelled;
                break;
            }
            if self.ctx.cache.has(chain, block).await {
                self.state.failed.remove(&block);
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => {
                    outcome = ScanOutcome::Cancelled;
                    break;
                }
                result = self
                    .process_block(block)
                    .instrument(spans::process_block(chain, block)) => result,
            };

            match result {
                Ok(_) => {
                    self.state.failed.remove(&block);
                    recovered.push(block);
                    info!(chain = %chain, block, "Previously failed block processed");
                }
                Err(e) if e.is_circuit_open() => {
                    outcome = ScanOutcome::CircuitOpen;
                    break;
                }
                Err(e) => self.record_failure(block, &e),
            }

            if !self.pause(self.current_settings_delay()).await {
                outcome = ScanOutcome::Cancelled;
                break;
            }
        }

        self.ctx.cache.mark_all(chain, &recovered).await;
        self.advance_cursor();
        outcome
    }

    async fn process_range(&mut self, range: BlockRange, tier: ThrottleTier) -> ScanOutcome {
        let chain = self.ctx.chain;
        let batch_size = self.ctx.config.tier_settings(tier).batch_size;
        let mut tally = ScanTally::default();
        let mut batches = range.batches(batch_size).peekable();

        while let Some(batch) = batches.next() {
            let mut completed = Vec::with_capacity(batch.len() as usize);
            let mut last_attempted = None;
            let mut stop = None;

            for block in batch.blocks() {
                if self.ctx.cancel.is_cancelled() {
                    stop = Some(ScanOutcome::Cancelled);
                    break;
                }
                self.poll_inbox();

                if self.ctx.cache.has(chain, block).await {
                    tally.cached += 1;
                    completed.push(block);
                    last_attempted = Some(block);
                    continue;
                }

                let result = tokio::select! {
                    biased;
                    _ = self.ctx.cancel.cancelled() => {
                        stop = Some(ScanOutcome::Cancelled);
                        break;
                    }
                    result = self
                        .process_block(block)
                        .instrument(spans::process_block(chain, block)) => result,
                };

                match result {
                    Ok(found) => {
                        tally.processed += 1;
                        tally.activity += found;
                        completed.push(block);
                    }
                    Err(e) if e.is_circuit_open() => {
                        warn!(chain = %chain, block, "Circuit opened mid-scan, ending scan");
                        stop = Some(ScanOutcome::CircuitOpen);
                        break;
                    }
                    Err(e) => {
                        tally.failed += 1;
                        self.record_failure(block, &e);
                    }
                }
                last_attempted = Some(block);

                let delay = self.current_settings_delay();
                if !self.pause(delay).await {
                    stop = Some(ScanOutcome::Cancelled);
                    break;
                }
            }

            self.finish_batch(&completed, last_attempted).await;

            if let Some(outcome) = stop {
                self.log_scan(range, &tally, outcome);
                return outcome;
            }

            if batches.peek().is_some() {
                let pause = self
                    .ctx
                    .config
                    .tier_settings(self.ctx.gate.tier())
                    .batch_pause;
                if !self.pause(pause).await {
                    self.log_scan(range, &tally, ScanOutcome::Cancelled);
                    return ScanOutcome::Cancelled;
                }
            }
        }

        self.log_scan(range, &tally, ScanOutcome::Completed);
        ScanOutcome::Completed
    }

    fn current_settings_delay(&self) -> Duration {
        self.ctx
            .config
            .tier_settings(self.ctx.gate.tier())
            .block_delay
    }

    /// Queries one block and publishes what it finds
    async fn process_block(&self, block: BlockNumber) -> Result<usize, CallError> {
        let provider = &self.ctx.provider;
        let chain = self.ctx.chain;
        let range = BlockRange::single(block);
        let wallets: Vec<Address> = self.wallets.iter().copied().collect();

        let events = self
            .ctx
            .gate
            .call(RpcMethod::WalletActivity, || {
                provider.wallet_activity(chain, range, &wallets)
            })
            .await?;

        let found = events.len();
        for event in events {
            if let Err(e) = self.ctx.sink.publish(event).await {
                warn!(chain = %chain, block, error = %e, "Failed to deliver activity event");
            }
        }
        Ok(found)
    }

    /// Counts a failed scan of `block`; past the retry budget the block is skipped
    fn record_failure(&mut self, block: BlockNumber, error: &CallError) {
        let retries = self.ctx.config.planner.failed_block_retries;
        let failures = self.state.failed.entry(block).or_insert(0);
        *failures += 1;
        let failures = *failures;

        if failures > retries {
            self.state.failed.remove(&block);
            error!(
                chain = %self.ctx.chain,
                block,
                failures,
                error = %error,
                "Block failed on every retry, skipping it"
            );
        } else {
            debug!(
                chain = %self.ctx.chain,
                block,
                failures,
                error = %error,
                "Block failed, retrying on the next scan"
            );
        }
    }

    async fn finish_batch(&mut self, completed: &[BlockNumber], last_attempted: Option<BlockNumber>) {
        self.ctx.cache.mark_all(self.ctx.chain, completed).await;
        self.state.frontier = self.state.frontier.max(last_attempted);
        self.advance_cursor();
    }

    /// Moves the cursor up to the block below the lowest outstanding failure,
    /// or to the frontier when nothing is outstanding. Never moves it back.
    fn advance_cursor(&mut self) {
        let candidate = match self.state.failed.keys().next() {
            Some(&lowest) => lowest.checked_sub(1),
            None => self.state.frontier,
        };
        let Some(candidate) = candidate.min(self.state.frontier) else {
            return;
        };
        // Nothing below the first scanned block was ever processed.
        if self.state.first_scanned.is_some_and(|first| candidate < first) {
            return;
        }
        if self.state.last_confirmed.is_none_or(|cursor| candidate > cursor) {
            self.state.last_confirmed = Some(candidate);
        }
    }

    /// Cancellable sleep; `false` if cancelled
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.ctx.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.ctx.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn log_scan(&self, range: BlockRange, tally: &ScanTally, outcome: ScanOutcome) {
        let message = "Scan complete";
        if tally.failed > 0 || outcome != ScanOutcome::Completed {
            warn!(
                chain = %self.ctx.chain,
                from_block = range.from(),
                to_block = range.to(),
                processed = tally.processed,
                cached = tally.cached,
                failed = tally.failed,
                activity = tally.activity,
                outcome = ?outcome,
                last_confirmed_block = ?self.state.last_confirmed,
                "Scan ended with failures"
            );
        } else {
            info!(
                chain = %self.ctx.chain,
                from_block = range.from(),
                to_block = range.to(),
                processed = tally.processed,
                cached = tally.cached,
                activity = tally.activity,
                last_confirmed_block = ?self.state.last_confirmed,
                "{message}"
            );
        }
    }

    fn status(&self) -> ChainStatus {
        let health = self.ctx.gate.snapshot();
        ChainStatus {
            chain: self.ctx.chain,
            last_confirmed_block: self.state.last_confirmed,
            tier: health.tier,
            consecutive_errors: health.consecutive_errors,
            errors_last_minute: health.errors_last_minute,
            breaker: health.breaker,
            breaker_tripped_at: health.breaker_tripped_at,
            connection_mode: self.state.mode,
            last_check: self.state.last_check,
            wallets: self.wallets.len(),
        }
    }
}

async fn recv_event(events: &mut Option<mpsc::Receiver<ConnectionEvent>>) -> Option<ConnectionEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::errors::ProviderError;
    use crate::rate_limit::RpcRateLimiter;
    use crate::sink::TracingSink;
    use crate::types::ActivityEvent;

    const CHAIN: NamedChain = NamedChain::Base;

    /// Quiet chain with an optional hanging head, hanging block or bad block
    struct StubProvider {
        head: AtomicU64,
        head_stalled: bool,
        stalled: Option<BlockNumber>,
        rejected: Option<BlockNumber>,
        queried: Mutex<Vec<BlockNumber>>,
    }

    impl StubProvider {
        fn new(head: BlockNumber) -> Self {
            Self {
                head: AtomicU64::new(head),
                head_stalled: false,
                stalled: None,
                rejected: None,
                queried: Mutex::new(Vec::new()),
            }
        }

        fn queried(&self) -> Vec<BlockNumber> {
            self.queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainProvider for StubProvider {
        async fn latest_block_number(&self, _: NamedChain) -> Result<BlockNumber, ProviderError> {
            if self.head_stalled {
                std::future::pending::<()>().await;
            }
            Ok(self.head.load(Ordering::SeqCst))
        }

        async fn wallet_activity(
            &self,
            _: NamedChain,
            range: BlockRange,
            _: &[Address],
        ) -> Result<Vec<ActivityEvent>, ProviderError> {
            self.queried.lock().unwrap().extend(range.blocks());
            if self.stalled.is_some_and(|block| range.contains(block)) {
                std::future::pending::<()>().await;
            }
            if self.rejected.is_some_and(|block| range.contains(block)) {
                return Err(ProviderError::bad_request("block range rejected"));
            }
            Ok(Vec::new())
        }
    }

    fn scheduler(provider: Arc<StubProvider>) -> ChainScheduler {
        let config = Arc::new(MonitorConfig::minimal());
        let ctx = ChainContext {
            chain: CHAIN,
            provider,
            gate: CallGate::new(CHAIN, &config, RpcRateLimiter::new(&config.rate_limit)),
            cache: Arc::new(ProcessedBlockCache::new(config.cache)),
            sink: Arc::new(TracingSink),
            config,
            cancel: CancellationToken::new(),
        };
        let (_commands, commands_rx) = mpsc::channel(1);
        let (_events, events_rx) = mpsc::channel(1);
        let mut scheduler = ChainScheduler::new(ctx, commands_rx, events_rx);
        scheduler.wallets.insert(Address::with_last_byte(1));
        scheduler
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_range_leaves_unfinished_blocks_unmarked() {
        let provider = Arc::new(StubProvider {
            stalled: Some(995),
            ..StubProvider::new(1_000)
        });
        let mut scheduler = scheduler(provider.clone());
        let cache = scheduler.ctx.cache.clone();
        let cancel = scheduler.ctx.cancel.clone();

        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(scheduler.scan(ScanKind::NewWallet), stop);

        assert_eq!(outcome, ScanOutcome::Cancelled);
        assert_eq!(scheduler.state.last_confirmed, Some(994));
        assert_eq!(scheduler.state.frontier, Some(994));
        assert!(scheduler.state.failed.is_empty());
        for block in 991..=994 {
            assert!(cache.has(CHAIN, block).await, "block {block} should be marked");
        }
        for block in 995..=1_000 {
            assert!(!cache.has(CHAIN, block).await, "block {block} should not be marked");
        }
        assert_eq!(provider.queried(), (991..=995).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hanging_head_fetch() {
        let provider = Arc::new(StubProvider {
            head_stalled: true,
            ..StubProvider::new(1_000)
        });
        let mut scheduler = scheduler(provider.clone());
        let cancel = scheduler.ctx.cancel.clone();
        let start = tokio::time::Instant::now();

        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(scheduler.scan(ScanKind::Regular), stop);
        assert_eq!(outcome, ScanOutcome::Cancelled);
        // Returned at cancellation, well before the per-attempt deadline
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        scheduler.freshness_check().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert!(provider.queried().is_empty());
        assert_eq!(scheduler.state.last_confirmed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_holds_when_head_lags_behind_it() {
        let provider = Arc::new(StubProvider::new(1_000));
        let mut scheduler = scheduler(provider.clone());

        assert_eq!(scheduler.scan(ScanKind::NewWallet).await, ScanOutcome::Completed);
        assert_eq!(scheduler.state.last_confirmed, Some(1_000));

        // A lagging replica reports an older head
        provider.head.store(900, Ordering::SeqCst);
        let queried = provider.queried().len();
        for kind in [ScanKind::Regular, ScanKind::Manual, ScanKind::NewWallet] {
            assert_eq!(scheduler.scan(kind).await, ScanOutcome::UpToDate);
            assert_eq!(scheduler.state.last_confirmed, Some(1_000));
        }
        assert_eq!(provider.queried().len(), queried);

        provider.head.store(1_005, Ordering::SeqCst);
        assert_eq!(scheduler.scan(ScanKind::Regular).await, ScanOutcome::Completed);
        assert_eq!(scheduler.state.last_confirmed, Some(1_005));
        assert_eq!(provider.queried().first(), Some(&991));
        assert_eq!(provider.queried().last(), Some(&1_005));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_block_is_skipped_once_retries_run_out() {
        let provider = Arc::new(StubProvider {
            rejected: Some(991),
            ..StubProvider::new(1_000)
        });
        let mut scheduler = scheduler(provider.clone());
        let retries = scheduler.ctx.config.planner.failed_block_retries;
        assert_eq!(retries, 3);

        assert_eq!(scheduler.scan(ScanKind::NewWallet).await, ScanOutcome::Completed);
        // Nothing below the failed first block was ever scanned
        assert_eq!(scheduler.state.last_confirmed, None);
        assert_eq!(scheduler.state.frontier, Some(1_000));

        for _ in 0..retries - 1 {
            assert_eq!(scheduler.scan(ScanKind::Regular).await, ScanOutcome::UpToDate);
            assert_eq!(scheduler.state.last_confirmed, None);
        }

        assert_eq!(scheduler.scan(ScanKind::Regular).await, ScanOutcome::UpToDate);
        assert_eq!(scheduler.state.last_confirmed, Some(1_000));
        assert!(scheduler.state.failed.is_empty());

        let attempts = provider.queried().iter().filter(|b| **b == 991).count();
        assert_eq!(attempts, 1 + retries as usize);
        // Structural failures do not move the chain's tier
        assert_eq!(scheduler.ctx.gate.snapshot().consecutive_errors, 0);
    }
}
