//! Span creation helpers for chainwatch operations.
//!
//! Telemetry stays out of business logic: each instrumented operation has a
//! helper here, and async code attaches it with `Instrument`:
//!
//! ```rust,ignore
//! async { /* scan */ }.instrument(spans::scan_range(chain, kind, from, to)).await
//! ```

use alloy_chains::NamedChain;
use alloy_primitives::BlockNumber;
use tracing::{Level, Span};

use crate::planner::ScanKind;

/// Root span for a chain's scheduler task.
///
/// Children: scan_range, freshness_check
#[inline]
pub(crate) fn chain_scheduler(chain: NamedChain) -> Span {
    tracing::span!(Level::INFO, "chainwatch.chain", chain = %chain)
}

/// Root span for a chain's connection manager task.
///
/// Children: reconnect
#[inline]
pub(crate) fn connection(chain: NamedChain) -> Span {
    tracing::info_span!("chainwatch.connection", chain = %chain)
}

/// Span for one planned scan.
///
/// Parent: chain_scheduler
/// Children: process_block spans (one per uncached block)
#[inline]
pub(crate) fn scan_range(
    chain: NamedChain,
    kind: ScanKind,
    from_block: BlockNumber,
    to_block: BlockNumber,
) -> Span {
    tracing::info_span!(
        "chainwatch.scan_range",
        chain = %chain,
        kind = %kind,
        from_block = from_block,
        to_block = to_block,
    )
}

/// Span for querying and publishing one block's activity.
///
/// Parent: scan_range
#[inline]
pub(crate) fn process_block(chain: NamedChain, block: BlockNumber) -> Span {
    tracing::trace_span!("chainwatch.process_block", chain = %chain, block = block)
}

/// Span for a freshness check after stream silence.
///
/// Parent: chain_scheduler
#[inline]
pub(crate) fn freshness_check(chain: NamedChain) -> Span {
    tracing::debug_span!("chainwatch.freshness_check", chain = %chain)
}

/// Span for one reconnect attempt.
///
/// Parent: connection
#[inline]
pub(crate) fn reconnect(chain: NamedChain, attempt: u32) -> Span {
    tracing::debug_span!("chainwatch.reconnect", chain = %chain, attempt = attempt)
}
