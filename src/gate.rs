// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! The single path every RPC call for a chain takes
//!
//! A [`CallGate`] composes, in order:
//!
//! 1. the chain's [`CircuitBreaker`] (fast `CircuitOpen` rejection)
//! 2. the [`RetryController`]; each attempt waits for the global
//!    latest-block-number spacing (that method only), holds a global
//!    concurrency permit, and fails as a timeout past `call_timeout`
//! 4. outcome accounting in the chain's [`ErrorAccountant`], which may trip the
//!    breaker
//!
//! Errors are counted once per exhausted call, not once per attempt.
//! Structural failures and circuit-open rejections are not counted.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_chains::NamedChain;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::circuit::{Admission, CircuitBreaker};
use crate::config::MonitorConfig;
use crate::errors::{CallError, ProviderError, RpcMethod};
use crate::rate_limit::RpcRateLimiter;
use crate::retry::RetryController;
use crate::throttle::ErrorAccountant;
use crate::types::{BreakerStatus, ThrottleTier};

#[derive(Debug)]
struct ChainHealth {
    breaker: CircuitBreaker,
    accountant: ErrorAccountant,
}

/// Point-in-time view of a chain's health counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Current throttle tier
    pub tier: ThrottleTier,
    /// Consecutive-error counter
    pub consecutive_errors: u32,
    /// Errors within the rolling window
    pub errors_last_minute: usize,
    /// Breaker state
    pub breaker: BreakerStatus,
    /// Wall-clock time of the last trip while not closed
    pub breaker_tripped_at: Option<DateTime<Utc>>,
}

/// Frees a half-open probe slot if the probing call is dropped mid-flight
struct ProbeGuard<'a> {
    health: &'a Mutex<ChainHealth>,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.health
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .breaker
                .release_probe();
        }
    }
}

/// Breaker, accounting and rate limiting for one chain's RPC calls
///
/// Clones share the same health state; the scheduler and connection manager
/// of a chain each hold one.
#[derive(Debug, Clone)]
pub struct CallGate {
    chain: NamedChain,
    health: Arc<Mutex<ChainHealth>>,
    limiter: RpcRateLimiter,
    retry: RetryController,
    trip_threshold: usize,
}

impl CallGate {
    /// Creates a gate with a closed breaker and zeroed counters
    pub fn new(chain: NamedChain, config: &MonitorConfig, limiter: RpcRateLimiter) -> Self {
        Self {
            chain,
            health: Arc::new(Mutex::new(ChainHealth {
                breaker: CircuitBreaker::new(config.breaker.cooldown),
                accountant: ErrorAccountant::new(config.throttle, config.breaker.error_window),
            })),
            limiter,
            retry: RetryController::new(config.retry),
            trip_threshold: config.breaker.trip_threshold.max(1),
        }
    }

    /// The chain this gate guards
    pub fn chain(&self) -> NamedChain {
        self.chain
    }

    fn health(&self) -> MutexGuard<'_, ChainHealth> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` through the breaker, rate limiter and retry controller
    ///
    /// `op` is invoked once per attempt; a global concurrency permit is held
    /// for the duration of each attempt only. An attempt that outlives the
    /// configured call timeout is dropped and counts as a transient timeout.
    pub async fn call<T, F, Fut>(&self, method: RpcMethod, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let admission = self.health().breaker.admit(Instant::now());
        let probe = match admission {
            Admission::Rejected => {
                return Err(CallError::CircuitOpen {
                    chain: self.chain,
                    method,
                })
            }
            Admission::Probe => {
                info!(chain = %self.chain, method = %method, "Circuit half-open, sending probe");
                Some(ProbeGuard {
                    health: &self.health,
                    armed: true,
                })
            }
            Admission::Allowed => None,
        };

        let limiter = &self.limiter;
        let call_timeout = self.retry.config().call_timeout;
        let result = self
            .retry
            .execute(method, || {
                let attempt = op();
                async move {
                    if method == RpcMethod::LatestBlockNumber {
                        limiter.await_block_number_slot().await;
                    }
                    let _permit = limiter.acquire().await;
                    match tokio::time::timeout(call_timeout, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::timeout(format!(
                            "{method} gave no response within {}ms",
                            call_timeout.as_millis()
                        ))),
                    }
                }
            })
            .await;

        let was_probe = probe.is_some();
        if let Some(guard) = probe {
            guard.disarm();
        }
        self.record_outcome(method, &result, was_probe);
        result
    }

    fn record_outcome<T>(&self, method: RpcMethod, result: &Result<T, CallError>, was_probe: bool) {
        let now = Instant::now();
        let mut health = self.health();

        match result {
            Ok(_) => {
                health.accountant.record_success();
                if was_probe {
                    health.breaker.close();
                    health.accountant.clear_window();
                    info!(chain = %self.chain, method = %method, "Probe succeeded, circuit closed");
                }
            }
            Err(err) if err.counts_as_error() => {
                health.accountant.record_error(now);
                let in_window = health.accountant.errors_in_window(now);
                let consecutive = health.accountant.consecutive_errors();

                if was_probe {
                    health.breaker.trip(now);
                    warn!(
                        chain = %self.chain,
                        method = %method,
                        error = %err,
                        "Probe failed, circuit reopened"
                    );
                } else if !health.breaker.is_tripped()
                    && (in_window >= self.trip_threshold || health.accountant.is_excessive())
                {
                    health.breaker.trip(now);
                    error!(
                        chain = %self.chain,
                        errors_in_window = in_window,
                        consecutive_errors = consecutive,
                        "Circuit breaker tripped"
                    );
                } else {
                    warn!(
                        chain = %self.chain,
                        method = %method,
                        error = %err,
                        consecutive_errors = consecutive,
                        tier = %health.accountant.tier(),
                        "RPC call failed"
                    );
                }
            }
            Err(err) => {
                // Structural: the provider answered, so a probe proves reachability.
                if was_probe {
                    health.breaker.close();
                    health.accountant.clear_window();
                }
                if !err.is_circuit_open() {
                    warn!(chain = %self.chain, method = %method, error = %err, "RPC call rejected");
                }
            }
        }
    }

    /// Returns `true` if the breaker would admit a call now
    pub fn is_available(&self) -> bool {
        self.health().breaker.would_admit(Instant::now())
    }

    /// Time until an open breaker admits a probe; `None` unless open
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        self.health().breaker.remaining_cooldown(Instant::now())
    }

    /// Current throttle tier
    pub fn tier(&self) -> ThrottleTier {
        self.health().accountant.tier()
    }

    /// Snapshot of the chain's counters and breaker state
    pub fn snapshot(&self) -> HealthSnapshot {
        let now = Instant::now();
        let mut health = self.health();
        HealthSnapshot {
            tier: health.accountant.tier(),
            consecutive_errors: health.accountant.consecutive_errors(),
            errors_last_minute: health.accountant.errors_in_window(now),
            breaker: health.breaker.status(),
            breaker_tripped_at: health.breaker.tripped_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::config::{MonitorConfigBuilder, ThrottleThresholds};
    use crate::RetryConfig;

    fn single_attempt() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn gate(trip_threshold: usize) -> CallGate {
        let config = MonitorConfigBuilder::new()
            .trip_threshold(trip_threshold)
            .retry(single_attempt())
            .build();
        let limiter = RpcRateLimiter::new(&config.rate_limit);
        CallGate::new(NamedChain::Base, &config, limiter)
    }

    async fn fail(gate: &CallGate) -> Result<u64, CallError> {
        gate.call(RpcMethod::WalletActivity, || async {
            Err(ProviderError::timeout("slow"))
        })
        .await
    }

    async fn succeed(gate: &CallGate, calls: &AtomicU32) -> Result<u64, CallError> {
        gate.call(RpcMethod::WalletActivity, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_at_threshold_and_short_circuits() {
        let gate = gate(5);
        let calls = AtomicU32::new(0);

        for _ in 0..4 {
            assert!(fail(&gate).await.is_err());
        }
        assert_eq!(gate.snapshot().breaker, BreakerStatus::Closed);

        assert!(fail(&gate).await.is_err());
        assert_eq!(gate.snapshot().breaker, BreakerStatus::Open);

        let result = succeed(&gate, &calls).await;
        assert!(matches!(result, Err(CallError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Rejections are not counted
        assert_eq!(gate.snapshot().consecutive_errors, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes_and_clears_window() {
        let gate = gate(2);
        let calls = AtomicU32::new(0);
        fail(&gate).await.ok();
        fail(&gate).await.ok();
        assert!(!gate.is_available());

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert!(gate.is_available());
        assert_eq!(succeed(&gate, &calls).await.unwrap(), 1);

        let snapshot = gate.snapshot();
        assert_eq!(snapshot.breaker, BreakerStatus::Closed);
        assert_eq!(snapshot.errors_last_minute, 0);
        assert_eq!(snapshot.consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let gate = gate(1);
        fail(&gate).await.ok();
        tokio::time::advance(Duration::from_secs(1800)).await;

        assert!(fail(&gate).await.is_err());
        assert_eq!(gate.snapshot().breaker, BreakerStatus::Open);
        assert!(!gate.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_structural_errors_not_counted() {
        let gate = gate(1);
        let result: Result<u64, _> = gate
            .call(RpcMethod::WalletActivity, || async {
                Err(ProviderError::bad_request("bad range"))
            })
            .await;

        assert!(matches!(result, Err(CallError::Structural { .. })));
        let snapshot = gate.snapshot();
        assert_eq!(snapshot.consecutive_errors, 0);
        assert_eq!(snapshot.breaker, BreakerStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_releases_slot() {
        let gate = gate(1);
        fail(&gate).await.ok();
        tokio::time::advance(Duration::from_secs(1800)).await;

        let pending = gate.call(RpcMethod::WalletActivity, || {
            std::future::pending::<Result<u64, ProviderError>>()
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), pending).await;
        assert!(timed_out.is_err());

        assert!(gate.is_available());
        assert_eq!(gate.snapshot().breaker, BreakerStatus::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_released_after_each_call() {
        let gate = gate(10);
        let calls = AtomicU32::new(0);
        succeed(&gate, &calls).await.unwrap();
        fail(&gate).await.ok();
        assert_eq!(gate.limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excessive_errors_force_trip_below_window_threshold() {
        let config = MonitorConfigBuilder::new()
            .trip_threshold(1_000)
            .throttle_thresholds(ThrottleThresholds {
                excessive_errors: 3,
                ..ThrottleThresholds::default()
            })
            .retry(single_attempt())
            .build();
        let gate = CallGate::new(
            NamedChain::Base,
            &config,
            RpcRateLimiter::new(&config.rate_limit),
        );

        for _ in 0..3 {
            fail(&gate).await.ok();
        }
        assert_eq!(gate.snapshot().breaker, BreakerStatus::Closed);

        // The fourth consecutive error passes the ceiling
        fail(&gate).await.ok();
        let snapshot = gate.snapshot();
        assert_eq!(snapshot.breaker, BreakerStatus::Open);
        assert_eq!(snapshot.errors_last_minute, 4);
        assert_eq!(
            gate.remaining_cooldown(),
            Some(config.breaker.cooldown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out_and_frees_permit() {
        let gate = gate(10);
        let start = Instant::now();

        let result = gate
            .call(RpcMethod::WalletActivity, || {
                std::future::pending::<Result<u64, ProviderError>>()
            })
            .await;

        match result {
            Err(CallError::RetriesExhausted { source, .. }) => {
                assert!(matches!(source, ProviderError::Timeout { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(gate.limiter.in_flight(), 0);
        assert_eq!(gate.snapshot().consecutive_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_head_attempt_waits_for_spacing() {
        let config = MonitorConfigBuilder::new()
            .block_number_spacing(Duration::from_millis(500))
            .retry(RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
                call_timeout: Duration::from_secs(5),
            })
            .build();
        let gate = CallGate::new(
            NamedChain::Base,
            &config,
            RpcRateLimiter::new(&config.rate_limit),
        );
        let start = Instant::now();
        let attempts = Mutex::new(Vec::new());

        let result: Result<u64, _> = gate
            .call(RpcMethod::LatestBlockNumber, || async {
                attempts.lock().unwrap().push(start.elapsed());
                Err(ProviderError::connection("reset"))
            })
            .await;

        assert!(result.is_err());
        // 100ms and 200ms backoffs are stretched to the 500ms spacing
        assert_eq!(
            *attempts.lock().unwrap(),
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1_000)
            ]
        );
    }
}
