// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Processed-block deduplication cache
//!
//! Records which blocks each chain has already finished scanning so repeated
//! triggers do not re-issue activity queries. The cache is advisory: a miss only
//! costs a redundant query, never lost activity, so it never reports errors.
//!
//! Records are bounded two ways, both enforced by [`ProcessedBlockCache::sweep`]:
//!
//! - records older than the configured max age are dropped
//! - a chain holding more than the per-chain cap loses its oldest records first

mod processed;

use std::fmt;

pub use processed::ProcessedBlockCache;

/// Statistics for the processed-block cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// `has` calls that found a record
    pub hits: u64,
    /// `has` calls that found nothing
    pub misses: u64,
    /// Records removed by the per-chain cap
    pub evictions: u64,
    /// Records removed for exceeding the max age
    pub expirations: u64,
    /// Records currently held across all chains
    pub entries: usize,
}

impl CacheStats {
    /// Calculates the cache hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={}, misses={}, evictions={}, expirations={}, entries={}, hit_rate={:.1}%",
            self.hits,
            self.misses,
            self.evictions,
            self.expirations,
            self.entries,
            self.hit_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
