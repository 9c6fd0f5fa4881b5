//! Test helpers for chainwatch integration tests
//!
//! Provides a scripted [`ChainProvider`] and a recording [`ActivitySink`] so
//! whole chains can be driven without a real RPC endpoint.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy_chains::NamedChain;
use alloy_primitives::{Address, BlockNumber};
use async_trait::async_trait;
use chainwatch::errors::SinkError;
use chainwatch::provider::{BlockStream, ChainProvider};
use chainwatch::sink::ActivitySink;
use chainwatch::{ActivityDetails, ActivityEvent, BlockRange, ProviderError, RpcMethod};
use futures::StreamExt;
use tokio::sync::mpsc;

/// What `subscribe_new_blocks` does once queued streams run out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionSupport {
    /// Structural failure: the chain goes straight to polling only
    Unsupported,
    /// Transient failure: the connection manager keeps reconnecting
    Failing,
}

/// Scripted chain provider
///
/// Every block has one synthetic activity event per watched wallet unless
/// the block is scripted to fail.
///
/// # Example
///
/// ```rust,ignore
/// let provider = Arc::new(MockProvider::new(NamedChain::Base, 1_000));
/// provider.fail_block(995, u32::MAX);
/// ```
pub struct MockProvider {
    chain: NamedChain,
    head: AtomicU64,
    head_failures: Mutex<u32>,
    block_failures: Mutex<HashMap<BlockNumber, u32>>,
    fail_everything: Mutex<bool>,
    quiet_blocks: Mutex<HashSet<BlockNumber>>,
    streams: Mutex<VecDeque<BlockStream>>,
    support: Mutex<SubscriptionSupport>,
    head_calls: AtomicU64,
    subscribe_calls: AtomicU64,
    activity_calls: Mutex<Vec<BlockRange>>,
}

impl MockProvider {
    /// Create a provider for `chain` whose head is `head`
    pub fn new(chain: NamedChain, head: BlockNumber) -> Self {
        Self {
            chain,
            head: AtomicU64::new(head),
            head_failures: Mutex::new(0),
            block_failures: Mutex::new(HashMap::new()),
            fail_everything: Mutex::new(false),
            quiet_blocks: Mutex::new(HashSet::new()),
            streams: Mutex::new(VecDeque::new()),
            support: Mutex::new(SubscriptionSupport::Unsupported),
            head_calls: AtomicU64::new(0),
            subscribe_calls: AtomicU64::new(0),
            activity_calls: Mutex::new(Vec::new()),
        }
    }

    /// Move the chain head
    pub fn set_head(&self, head: BlockNumber) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Fail the next `times` activity queries for `block` with a timeout
    ///
    /// `u32::MAX` fails forever.
    pub fn fail_block(&self, block: BlockNumber, times: u32) {
        self.block_failures.lock().unwrap().insert(block, times);
    }

    /// Stop failing `block`
    pub fn heal_block(&self, block: BlockNumber) {
        self.block_failures.lock().unwrap().remove(&block);
    }

    /// Fail the next `times` latest-block queries with a connection error
    pub fn fail_head(&self, times: u32) {
        *self.head_failures.lock().unwrap() = times;
    }

    /// Fail every head and activity query while set
    pub fn fail_everything(&self, fail: bool) {
        *self.fail_everything.lock().unwrap() = fail;
    }

    /// `block` has no activity
    pub fn quiet_block(&self, block: BlockNumber) {
        self.quiet_blocks.lock().unwrap().insert(block);
    }

    /// Behaviour once queued streams are used up
    pub fn with_subscriptions(self, support: SubscriptionSupport) -> Self {
        *self.support.lock().unwrap() = support;
        self
    }

    /// Queue a subscription and return the sender that feeds it
    ///
    /// Dropping the sender ends the stream.
    pub fn push_stream(&self) -> mpsc::UnboundedSender<BlockNumber> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|block| (block, rx))
        })
        .boxed();
        self.streams.lock().unwrap().push_back(stream);
        tx
    }

    /// Number of provider-level latest-block calls, retries included
    pub fn head_calls(&self) -> u64 {
        self.head_calls.load(Ordering::SeqCst)
    }

    /// Number of provider-level subscribe calls, retries included
    pub fn subscribe_calls(&self) -> u64 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Every activity query received, retries included
    pub fn activity_calls(&self) -> Vec<BlockRange> {
        self.activity_calls.lock().unwrap().clone()
    }

    /// Distinct blocks queried for activity, ascending
    pub fn queried_blocks(&self) -> Vec<BlockNumber> {
        let mut blocks: Vec<_> = self
            .activity_calls()
            .iter()
            .flat_map(|range| range.blocks())
            .collect();
        blocks.sort_unstable();
        blocks.dedup();
        blocks
    }

    fn take_failure(counter: &mut u32) -> bool {
        match *counter {
            0 => false,
            u32::MAX => true,
            _ => {
                *counter -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    async fn latest_block_number(&self, chain: NamedChain) -> Result<BlockNumber, ProviderError> {
        assert_eq!(chain, self.chain);
        self.head_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_everything.lock().unwrap()
            || Self::take_failure(&mut self.head_failures.lock().unwrap())
        {
            return Err(ProviderError::connection("connection reset"));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn wallet_activity(
        &self,
        chain: NamedChain,
        range: BlockRange,
        wallets: &[Address],
    ) -> Result<Vec<ActivityEvent>, ProviderError> {
        assert_eq!(chain, self.chain);
        self.activity_calls.lock().unwrap().push(range);

        if *self.fail_everything.lock().unwrap() {
            return Err(ProviderError::timeout("request timed out"));
        }
        {
            let mut failures = self.block_failures.lock().unwrap();
            for block in range.blocks() {
                if let Some(counter) = failures.get_mut(&block) {
                    if Self::take_failure(counter) {
                        return Err(ProviderError::timeout(format!("block {block} timed out")));
                    }
                }
            }
        }

        let quiet = self.quiet_blocks.lock().unwrap();
        Ok(range
            .blocks()
            .filter(|block| !quiet.contains(block))
            .flat_map(|block| {
                wallets.iter().map(move |wallet| ActivityEvent {
                    chain,
                    block_number: block,
                    wallet: *wallet,
                    details: ActivityDetails::Other {
                        payload: serde_json::json!({ "block": block }),
                    },
                })
            })
            .collect())
    }

    async fn subscribe_new_blocks(&self, chain: NamedChain) -> Result<BlockStream, ProviderError> {
        assert_eq!(chain, self.chain);
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(stream) = self.streams.lock().unwrap().pop_front() {
            return Ok(stream);
        }
        match *self.support.lock().unwrap() {
            SubscriptionSupport::Unsupported => Err(ProviderError::UnsupportedMethod {
                method: RpcMethod::SubscribeNewBlocks,
            }),
            SubscriptionSupport::Failing => Err(ProviderError::connection("websocket refused")),
        }
    }
}

/// Sink that keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far, in delivery order
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Blocks with at least one event for `wallet`, in delivery order
    pub fn blocks_for(&self, wallet: Address) -> Vec<BlockNumber> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.wallet == wallet)
            .map(|event| event.block_number)
            .collect()
    }
}

#[async_trait]
impl ActivitySink for RecordingSink {
    async fn publish(&self, event: ActivityEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Poll `condition` on virtual time until it holds
///
/// Panics after `limit` of (paused) time has passed.
pub async fn wait_until<F, Fut>(limit: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while !condition().await {
        assert!(waited < limit, "condition not met within {limit:?}");
        tokio::time::sleep(step).await;
        waited += step;
    }
}

/// A deterministic wallet address
pub fn wallet(n: u8) -> Address {
    Address::with_last_byte(n)
}
