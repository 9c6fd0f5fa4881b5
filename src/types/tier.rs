//! Throttle tiers and the pacing tuple each one maps to

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discrete operating mode controlling scan aggressiveness.
///
/// The tier is always derived from a chain's error counters by the
/// [`ErrorAccountant`](crate::throttle::ErrorAccountant); it has no setter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleTier {
    /// Healthy provider; full speed.
    #[default]
    Normal,
    /// Some recent failures; smaller ranges and longer pauses.
    Moderate,
    /// Sustained failures; minimal load on the provider.
    Aggressive,
}

impl ThrottleTier {
    /// Lowercase name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ThrottleTier::Normal => "normal",
            ThrottleTier::Moderate => "moderate",
            ThrottleTier::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for ThrottleTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pacing parameters for one [`ThrottleTier`].
///
/// # Examples
///
/// ```
/// use chainwatch::TierSettings;
/// use std::time::Duration;
///
/// let settings = TierSettings::new(50, 5, Duration::from_millis(200), Duration::from_secs(2));
/// assert_eq!(settings.block_range, 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSettings {
    /// Blocks covered by one scan
    pub block_range: u64,
    /// Blocks processed per batch within a scan
    pub batch_size: usize,
    /// Pause between individual blocks
    pub block_delay: Duration,
    /// Pause between batches
    pub batch_pause: Duration,
}

impl TierSettings {
    /// Creates a new settings tuple. A zero range or batch size is raised to one.
    pub const fn new(
        block_range: u64,
        batch_size: usize,
        block_delay: Duration,
        batch_pause: Duration,
    ) -> Self {
        Self {
            block_range: if block_range == 0 { 1 } else { block_range },
            batch_size: if batch_size == 0 { 1 } else { batch_size },
            block_delay,
            batch_pause,
        }
    }

    pub(crate) const fn from_tuple(tuple: (u64, usize, u64, u64)) -> Self {
        Self::new(
            tuple.0,
            tuple.1,
            Duration::from_millis(tuple.2),
            Duration::from_millis(tuple.3),
        )
    }
}
