//! Inclusive block ranges and batch iteration

use alloy_primitives::BlockNumber;
use serde::{Deserialize, Serialize};

/// A contiguous, inclusive span of block numbers.
///
/// # Examples
///
/// ```
/// use chainwatch::BlockRange;
///
/// let range = BlockRange::new(100, 124).unwrap();
/// assert_eq!(range.len(), 25);
///
/// let batches: Vec<_> = range.batches(10).collect();
/// assert_eq!(batches.len(), 3);
/// assert_eq!(batches[2], BlockRange::new(120, 124).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    from: BlockNumber,
    to: BlockNumber,
}

impl BlockRange {
    /// Creates a range, returning `None` if `to < from`.
    pub fn new(from: BlockNumber, to: BlockNumber) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// A range covering a single block.
    pub fn single(block: BlockNumber) -> Self {
        Self {
            from: block,
            to: block,
        }
    }

    /// First block (inclusive).
    pub fn from(&self) -> BlockNumber {
        self.from
    }

    /// Last block (inclusive).
    pub fn to(&self) -> BlockNumber {
        self.to
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Always `false`; a range holds at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `block` lies within the range.
    pub fn contains(&self, block: BlockNumber) -> bool {
        self.from <= block && block <= self.to
    }

    /// Iterates over the block numbers in ascending order.
    pub fn blocks(&self) -> std::ops::RangeInclusive<BlockNumber> {
        self.from..=self.to
    }

    /// Splits the range into consecutive sub-ranges of at most `batch_size` blocks.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn batches(&self, batch_size: usize) -> BatchIterator {
        BatchIterator {
            current: Some(self.from),
            end: self.to,
            batch_size: batch_size.max(1) as u64,
        }
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Iterator over batches of a [`BlockRange`].
///
/// Created by [`BlockRange::batches`].
#[derive(Debug, Clone)]
pub struct BatchIterator {
    current: Option<BlockNumber>,
    end: BlockNumber,
    batch_size: u64,
}

impl Iterator for BatchIterator {
    type Item = BlockRange;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.current?;
        let end = start
            .saturating_add(self.batch_size - 1)
            .min(self.end);

        // Avoid overflow when the range ends at u64::MAX
        self.current = if end >= self.end { None } else { Some(end + 1) };

        Some(BlockRange {
            from: start,
            to: end,
        })
    }
}
