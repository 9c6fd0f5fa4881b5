//! Errors from the monitor's public handle and the activity sink.

use alloy_chains::NamedChain;

/// Errors returned by an [`ActivitySink`](crate::sink::ActivitySink).
///
/// Sink failures are logged by the scheduler; they never stop a scan.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The downstream consumer has gone away.
    #[error("Activity sink closed")]
    Closed,

    /// The sink rejected the event.
    #[error("Activity sink rejected event: {details}")]
    Rejected {
        /// Details about the rejection
        details: String,
    },
}

/// Errors returned by [`Monitor`](crate::monitor::Monitor) operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No provider has been registered for the chain.
    #[error("No provider registered for {chain}")]
    NoProvider {
        /// The chain that was requested
        chain: NamedChain,
    },

    /// The chain is not currently being watched.
    #[error("Chain {chain} is not being watched")]
    ChainNotWatched {
        /// The chain that was requested
        chain: NamedChain,
    },

    /// The chain's scheduler task has stopped and can no longer take commands.
    #[error("Scheduler for {chain} is no longer running")]
    SchedulerStopped {
        /// The chain whose scheduler stopped
        chain: NamedChain,
    },

    /// The monitor has been shut down.
    #[error("Monitor has been shut down")]
    ShutDown,
}
