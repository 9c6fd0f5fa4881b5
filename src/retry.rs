//! Retry controller with exponential backoff for individual RPC calls.
//!
//! Wraps a single provider call and retries transient failures. The backoff
//! formula is:
//!
//! ```text
//! delay = min(base_delay * 2^attempt, max_delay)
//! ```
//!
//! Structural failures fail immediately without consuming retry budget.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::constants;
use crate::errors::{CallError, ProviderError, RpcMethod};

/// Configuration for retry behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Deadline for a single attempt; an attempt that overruns it fails as a timeout.
    pub call_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::retry::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(constants::retry::BASE_DELAY_MS),
            max_delay: Duration::from_millis(constants::retry::MAX_DELAY_MS),
            call_timeout: Duration::from_secs(constants::retry::CALL_TIMEOUT_SECS),
        }
    }
}

impl RetryConfig {
    /// Creates a config with a specific attempt cap and default delays.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chainwatch::RetryConfig;
    ///
    /// let config = RetryConfig::with_max_attempts(5);
    /// assert_eq!(config.max_attempts, 5);
    /// ```
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    fn attempt_cap(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Backoff bookkeeping for one in-flight retryable call.
///
/// `attempts` never exceeds the configured cap and `next_delay` never exceeds
/// the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    attempts: u32,
    next_delay: Duration,
}

impl BackoffState {
    /// State before the first attempt.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempts: 0,
            next_delay: calculate_backoff(0, config),
        }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay that will precede the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Records a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` if the
    /// attempt cap has been reached.
    pub fn record_failure(&mut self, config: &RetryConfig) -> Option<Duration> {
        self.attempts = (self.attempts + 1).min(config.attempt_cap());
        if self.attempts >= config.attempt_cap() {
            return None;
        }
        let delay = self.next_delay;
        self.next_delay = calculate_backoff(self.attempts, config);
        Some(delay)
    }
}

/// Executes provider calls with exponential backoff.
///
/// # Example
///
/// ```rust,ignore
/// use chainwatch::{RetryController, RetryConfig, RpcMethod};
///
/// let retry = RetryController::new(RetryConfig::default());
/// let latest = retry
///     .execute(RpcMethod::LatestBlockNumber, || provider.latest_block_number(chain))
///     .await?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    /// Creates a controller with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The controller's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, fails structurally, or exhausts its attempts.
    pub async fn execute<T, F, Fut>(&self, method: RpcMethod, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut backoff = BackoffState::new(&self.config);

        loop {
            match op().await {
                Ok(value) => {
                    if backoff.attempts() > 0 {
                        debug!(
                            method = %method,
                            attempt = backoff.attempts() + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_transient() {
                        debug!(method = %method, error = %error, "Non-retryable error, not retrying");
                        return Err(CallError::Structural {
                            method,
                            source: error,
                        });
                    }

                    match backoff.record_failure(&self.config) {
                        None => {
                            warn!(
                                method = %method,
                                error = %error,
                                attempts = backoff.attempts(),
                                "Max retries exceeded"
                            );
                            return Err(CallError::RetriesExhausted {
                                method,
                                attempts: backoff.attempts(),
                                source: error,
                            });
                        }
                        Some(delay) => {
                            warn!(
                                method = %method,
                                error = %error,
                                attempt = backoff.attempts(),
                                max_attempts = self.config.attempt_cap(),
                                delay_ms = delay.as_millis() as u64,
                                "Retryable error, backing off"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }
    }
}

/// Calculates the backoff duration for a given attempt.
///
/// Uses exponential backoff: `min(base_delay * 2^attempt, max_delay)`
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    exponential_delay(attempt, config.base_delay, config.max_delay)
}

/// `min(base * 2^attempt, max)` without overflow.
pub(crate) fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt);
    let delay_ms = base.as_millis().saturating_mul(multiplier as u128);
    let capped_delay_ms = delay_ms.min(max.as_millis()) as u64;
    Duration::from_millis(capped_delay_ms)
}
