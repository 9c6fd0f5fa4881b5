//! Strongly-typed domain values
//!
//! - [`ThrottleTier`] / [`TierSettings`]: scan pacing
//! - [`BlockRange`]: inclusive block spans with batch iteration
//! - [`ActivityEvent`]: wallet activity delivered downstream
//! - [`ChainStatus`]: per-chain state snapshots
//! - [`WatchEntry`]: a watched `(chain, wallet)` pair

mod activity;
mod block;
mod status;
mod tier;
mod watch;

pub use activity::{ActivityDetails, ActivityEvent, TransferDirection};
pub use block::{BatchIterator, BlockRange};
pub use status::{BreakerStatus, ChainStatus, ConnectionMode};
pub use tier::{ThrottleTier, TierSettings};
pub use watch::WatchEntry;
