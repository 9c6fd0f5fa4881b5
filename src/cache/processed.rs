use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use alloy_chains::NamedChain;
use alloy_primitives::BlockNumber;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::CacheStats;
use crate::config::CacheConfig;

/// Records for one chain, kept in insertion order
#[derive(Debug, Default)]
struct ChainRecords {
    inserted_at: HashMap<BlockNumber, Instant>,
    /// Oldest first. Each block appears once because re-marking is a no-op.
    order: VecDeque<(BlockNumber, Instant)>,
}

impl ChainRecords {
    fn len(&self) -> usize {
        self.inserted_at.len()
    }

    fn pop_oldest(&mut self) {
        if let Some((block, _)) = self.order.pop_front() {
            self.inserted_at.remove(&block);
        }
    }

    fn oldest(&self) -> Option<Instant> {
        self.order.front().map(|(_, at)| *at)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    chains: HashMap<NamedChain, ChainRecords>,
    stats: CacheStats,
}

impl CacheState {
    fn refresh_entries(&mut self) {
        self.stats.entries = self.chains.values().map(ChainRecords::len).sum();
    }
}

/// Per-chain set of processed block numbers with age and size bounds
///
/// Shared by every chain's scheduler and the background sweeper. All access is
/// serialized through one async mutex; critical sections are short map
/// operations.
///
/// # Examples
///
/// ```rust
/// use alloy_chains::NamedChain;
/// use chainwatch::{config::CacheConfig, ProcessedBlockCache};
///
/// # tokio_test_block_on(async {
/// let cache = ProcessedBlockCache::new(CacheConfig::default());
/// cache.mark(NamedChain::Base, 100).await;
/// assert!(cache.has(NamedChain::Base, 100).await);
/// assert!(!cache.has(NamedChain::Mainnet, 100).await);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct ProcessedBlockCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl ProcessedBlockCache {
    /// Creates an empty cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns `true` if `block` has been marked for `chain` and not yet evicted
    pub async fn has(&self, chain: NamedChain, block: BlockNumber) -> bool {
        let mut state = self.state.lock().await;
        let found = state
            .chains
            .get(&chain)
            .is_some_and(|records| records.inserted_at.contains_key(&block));

        if found {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        found
    }

    /// Records `block` as processed for `chain`
    ///
    /// Marking an already-present block keeps its original insertion time.
    pub async fn mark(&self, chain: NamedChain, block: BlockNumber) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let records = state.chains.entry(chain).or_default();

        if records.inserted_at.contains_key(&block) {
            return;
        }
        records.inserted_at.insert(block, now);
        records.order.push_back((block, now));
        state.stats.entries += 1;
    }

    /// Marks every block in `blocks` for `chain` under a single lock
    pub async fn mark_all(&self, chain: NamedChain, blocks: &[BlockNumber]) {
        if blocks.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let records = state.chains.entry(chain).or_default();

        let mut added = 0;
        for &block in blocks {
            if records.inserted_at.contains_key(&block) {
                continue;
            }
            records.inserted_at.insert(block, now);
            records.order.push_back((block, now));
            added += 1;
        }
        state.stats.entries += added;
    }

    /// Removes expired records, then enforces the per-chain cap
    ///
    /// The reference time is captured before the lock is taken, and only
    /// records inserted at or before it are eligible for removal, so a block
    /// marked while the sweep is waiting for the lock survives this sweep.
    ///
    /// Returns the number of records removed.
    pub async fn sweep(&self) -> usize {
        let snapshot = Instant::now();
        let max_age = self.config.max_age;
        let cap = self.config.max_entries_per_chain;

        let mut state = self.state.lock().await;
        let mut expired = 0u64;
        let mut evicted = 0u64;

        for records in state.chains.values_mut() {
            while let Some(oldest) = records.oldest() {
                if oldest > snapshot || snapshot.saturating_duration_since(oldest) <= max_age {
                    break;
                }
                records.pop_oldest();
                expired += 1;
            }

            while records.len() > cap {
                match records.oldest() {
                    Some(oldest) if oldest <= snapshot => {
                        records.pop_oldest();
                        evicted += 1;
                    }
                    _ => break,
                }
            }
        }

        state.chains.retain(|_, records| records.len() > 0);
        state.stats.expirations += expired;
        state.stats.evictions += evicted;
        state.refresh_entries();

        let removed = (expired + evicted) as usize;
        if removed > 0 {
            debug!(
                expired,
                evicted,
                remaining = state.stats.entries,
                "Swept processed-block cache"
            );
        }
        removed
    }

    /// Records held for `chain`
    pub async fn len(&self, chain: NamedChain) -> usize {
        let state = self.state.lock().await;
        state.chains.get(&chain).map_or(0, ChainRecords::len)
    }

    /// Returns `true` if no records are held for any chain
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.chains.is_empty()
    }

    /// Drops every record for `chain`
    pub async fn clear_chain(&self, chain: NamedChain) {
        let mut state = self.state.lock().await;
        if let Some(records) = state.chains.remove(&chain) {
            debug!(chain = %chain, entries = records.len(), "Cleared processed-block records");
        }
        state.refresh_entries();
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }

    /// Runs [`sweep`](Self::sweep) every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        self: std::sync::Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Processed-block sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        })
    }
}
