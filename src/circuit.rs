// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Per-chain circuit breaker
//!
//! ```text
//!            trip                 cooldown elapsed, next call
//!  Closed ─────────▶ Open ───────────────────────────────▶ HalfOpen (one probe)
//!    ▲                 ▲                                        │
//!    │                 └──────────── probe failed ──────────────┤
//!    └──────────────────────────── probe succeeded ─────────────┘
//! ```
//!
//! The breaker only tracks state. Deciding when to trip belongs to the
//! [`CallGate`](crate::gate::CallGate), which combines it with the chain's
//! [`ErrorAccountant`](crate::throttle::ErrorAccountant).

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::types::BreakerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Result of asking the breaker whether a call may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; the call proceeds normally
    Allowed,
    /// Breaker half-open; this call is the single probe
    Probe,
    /// Breaker open or a probe is already in flight
    Rejected,
}

/// Trip/cooldown state machine for one chain
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    cooldown: Duration,
    state: BreakerState,
    tripped_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// Creates a closed breaker
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: BreakerState::Closed,
            tripped_at: None,
        }
    }

    /// Decides whether a call may proceed at `now`
    ///
    /// An open breaker whose cooldown has fully elapsed moves to half-open and
    /// admits the caller as the probe. Further callers are rejected until the
    /// probe resolves.
    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open { since } => {
                if now.saturating_duration_since(since) >= self.cooldown {
                    self.state = BreakerState::HalfOpen {
                        probe_in_flight: true,
                    };
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen {
                probe_in_flight: true,
            } => Admission::Rejected,
            BreakerState::HalfOpen {
                probe_in_flight: false,
            } => {
                self.state = BreakerState::HalfOpen {
                    probe_in_flight: true,
                };
                Admission::Probe
            }
        }
    }

    /// Returns `true` if [`admit`](Self::admit) would not reject at `now`
    ///
    /// Does not change state.
    pub fn would_admit(&self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open { since } => now.saturating_duration_since(since) >= self.cooldown,
            BreakerState::HalfOpen { probe_in_flight } => !probe_in_flight,
        }
    }

    /// Opens the breaker, starting a fresh cooldown
    pub fn trip(&mut self, now: Instant) {
        self.state = BreakerState::Open { since: now };
        self.tripped_at = Some(Utc::now());
    }

    /// Closes the breaker after a successful probe
    pub fn close(&mut self) {
        self.state = BreakerState::Closed;
        self.tripped_at = None;
    }

    /// Frees the probe slot without resolving it
    ///
    /// Used when the probing caller is cancelled before an outcome is known.
    pub fn release_probe(&mut self) {
        if let BreakerState::HalfOpen {
            probe_in_flight: true,
        } = self.state
        {
            self.state = BreakerState::HalfOpen {
                probe_in_flight: false,
            };
        }
    }

    /// Returns `true` unless the breaker is closed
    pub fn is_tripped(&self) -> bool {
        !matches!(self.state, BreakerState::Closed)
    }

    /// Snapshot for status reporting
    pub fn status(&self) -> BreakerStatus {
        match self.state {
            BreakerState::Closed => BreakerStatus::Closed,
            BreakerState::Open { .. } => BreakerStatus::Open,
            BreakerState::HalfOpen { .. } => BreakerStatus::HalfOpen,
        }
    }

    /// Wall-clock time of the most recent trip, while not closed
    pub fn tripped_at(&self) -> Option<DateTime<Utc>> {
        self.tripped_at
    }

    /// Time left before a probe is allowed, if open
    pub fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        match self.state {
            BreakerState::Open { since } => {
                Some(self.cooldown.saturating_sub(now.saturating_duration_since(since)))
            }
            _ => None,
        }
    }
}
