//! Delivery of discovered activity to downstream consumers
//!
//! The scheduler publishes each discovered event once per scanned block.
//! Persistence, fan-out and de-duplication of re-deliveries are the sink's
//! concern. Sink failures are logged and never stop a scan.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::errors::SinkError;
use crate::types::{ActivityDetails, ActivityEvent};

/// Receiver of wallet activity events
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Delivers one event
    async fn publish(&self, event: ActivityEvent) -> Result<(), SinkError>;
}

/// Forwards events over a bounded tokio channel
///
/// Publishing waits for capacity, so a slow consumer applies backpressure to
/// the scanning chain.
///
/// # Example
///
/// ```rust
/// use chainwatch::sink::ChannelSink;
///
/// let (sink, mut events) = ChannelSink::new(256);
/// # drop(sink);
/// # assert!(events.try_recv().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ActivityEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ActivityEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Wraps an existing sender
    pub fn from_sender(tx: mpsc::Sender<ActivityEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ActivitySink for ChannelSink {
    async fn publish(&self, event: ActivityEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

/// Logs each event at `info`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ActivitySink for TracingSink {
    async fn publish(&self, event: ActivityEvent) -> Result<(), SinkError> {
        match &event.details {
            ActivityDetails::TokenTransfer {
                token,
                value,
                direction,
                tx_hash,
                ..
            } => info!(
                chain = %event.chain,
                block_number = event.block_number,
                wallet = %event.wallet,
                token = %token,
                value = %value,
                direction = ?direction,
                tx_hash = ?tx_hash,
                "Token transfer"
            ),
            ActivityDetails::Other { payload } => info!(
                chain = %event.chain,
                block_number = event.block_number,
                wallet = %event.wallet,
                payload = %payload,
                "Wallet activity"
            ),
        }
        Ok(())
    }
}
