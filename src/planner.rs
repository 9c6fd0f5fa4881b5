//! Block range planning
//!
//! Decides which blocks the next scan covers. With a cursor the next range
//! starts exactly one block past it (minus any configured overlap), so
//! consecutive scans never leave a gap. Without a cursor the range is the tail
//! of the chain ending at the latest block.

use alloy_chains::NamedChain;
use alloy_primitives::BlockNumber;

use crate::config::MonitorConfig;
use crate::types::{BlockRange, ThrottleTier};

/// Why a scan is being run; determines its range size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScanKind {
    /// Timer or block notification; sized by the current tier
    Regular,
    /// First scan after a wallet with no history was added; small backfill
    NewWallet,
    /// Forced check; large fixed range regardless of tier
    Manual,
}

impl ScanKind {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ScanKind::Regular => "regular",
            ScanKind::NewWallet => "new_wallet",
            ScanKind::Manual => "manual",
        }
    }

    /// Combines two pending triggers into the one that should run
    ///
    /// Manual dominates NewWallet, which dominates Regular.
    pub fn merge(self, other: ScanKind) -> ScanKind {
        self.max(other)
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Plans scan ranges for one chain from configuration
#[derive(Debug, Clone)]
pub struct RangePlanner {
    chain: NamedChain,
    tier_ranges: [u64; 3],
    new_wallet_range: u64,
    manual_range: u64,
    overlap: u64,
}

impl RangePlanner {
    /// Creates a planner using `config`'s values and `chain`'s overrides
    pub fn new(chain: NamedChain, config: &MonitorConfig) -> Self {
        Self {
            chain,
            tier_ranges: [
                config.tier_settings(ThrottleTier::Normal).block_range,
                config.tier_settings(ThrottleTier::Moderate).block_range,
                config.tier_settings(ThrottleTier::Aggressive).block_range,
            ],
            new_wallet_range: config.get_new_wallet_range(chain),
            manual_range: config.get_manual_range(chain),
            overlap: config.planner.overlap_blocks,
        }
    }

    /// Number of blocks a scan of `kind` at `tier` covers
    pub fn range_size(&self, kind: ScanKind, tier: ThrottleTier) -> u64 {
        let size = match kind {
            ScanKind::Regular => match tier {
                ThrottleTier::Normal => self.tier_ranges[0],
                ThrottleTier::Moderate => self.tier_ranges[1],
                ThrottleTier::Aggressive => self.tier_ranges[2],
            },
            ScanKind::NewWallet => self.new_wallet_range,
            ScanKind::Manual => self.manual_range,
        };
        size.max(1)
    }

    /// Next range to scan, or `None` if the chain has nothing new
    ///
    /// # Examples
    ///
    /// ```rust
    /// use alloy_chains::NamedChain;
    /// use chainwatch::{planner::{RangePlanner, ScanKind}, MonitorConfig, ThrottleTier};
    ///
    /// let planner = RangePlanner::new(NamedChain::Base, &MonitorConfig::default());
    ///
    /// // No history: the last 10 blocks
    /// let range = planner.plan(None, 1_000, ThrottleTier::Normal, ScanKind::NewWallet).unwrap();
    /// assert_eq!((range.from(), range.to()), (991, 1_000));
    ///
    /// // Continuing from a cursor: starts one past it
    /// let range = planner.plan(Some(1_000), 1_500, ThrottleTier::Normal, ScanKind::Regular).unwrap();
    /// assert_eq!((range.from(), range.to()), (1_001, 1_100));
    ///
    /// // Caught up
    /// assert!(planner.plan(Some(1_500), 1_500, ThrottleTier::Normal, ScanKind::Regular).is_none());
    /// ```
    pub fn plan(
        &self,
        last_confirmed: Option<BlockNumber>,
        latest: BlockNumber,
        tier: ThrottleTier,
        kind: ScanKind,
    ) -> Option<BlockRange> {
        let size = self.range_size(kind, tier);

        let from = match last_confirmed {
            Some(cursor) => {
                if cursor >= latest {
                    return None;
                }
                cursor.saturating_add(1).saturating_sub(self.overlap)
            }
            None => latest.saturating_sub(size - 1),
        };
        let to = from.saturating_add(size - 1).min(latest);

        let range = BlockRange::new(from, to)?;
        tracing::trace!(
            chain = %self.chain,
            kind = %kind,
            tier = %tier,
            from_block = range.from(),
            to_block = range.to(),
            "Planned scan range"
        );
        Some(range)
    }
}
