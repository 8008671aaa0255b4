//! Deterministic exponential backoff.
//!
//! A [`BackoffPolicy`] maps a retry number to the wait before that retry.
//! The same policy type drives both the HTTP client and the step executor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upper bound on a single backoff wait.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(120);

/// Exponential backoff with a cap.
///
/// `delay(n) = min(factor * 2^(n-1), max_delay)` for `n >= 1`, and
/// `delay(0) = 0`. With `immediate_first_retry` the first retry is not
/// delayed either, which gives the HTTP schedule
/// `0, 10, 20, 40, 80, 120, 120, 120, 120` seconds for a 5 s factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Multiplier applied to `2^(n-1)`.
    pub factor: Duration,
    /// Cap on a single wait.
    pub max_delay: Duration,
    /// Whether retry number 1 is attempted without waiting.
    pub immediate_first_retry: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::step(Duration::from_secs(5))
    }
}

impl BackoffPolicy {
    /// Creates a policy with the given factor and cap.
    #[must_use]
    pub const fn new(factor: Duration, max_delay: Duration) -> Self {
        Self {
            factor,
            max_delay,
            immediate_first_retry: false,
        }
    }

    /// Policy used below the HTTP client: first retry immediate, then exponential.
    #[must_use]
    pub const fn http(factor: Duration, max_delay: Duration) -> Self {
        Self {
            factor,
            max_delay,
            immediate_first_retry: true,
        }
    }

    /// Policy used by the step executor: `base, 2*base, 4*base, ...`.
    #[must_use]
    pub const fn step(base: Duration) -> Self {
        Self::new(base, DEFAULT_BACKOFF_MAX)
    }

    /// A policy that never waits.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Sets the cap.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns the wait before retry number `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || (attempt == 1 && self.immediate_first_retry) {
            return Duration::ZERO;
        }
        // 2^31 already saturates any realistic factor.
        let exponent = (attempt - 1).min(31);
        let multiplier = 1u32 << exponent;
        self.factor.saturating_mul(multiplier).min(self.max_delay)
    }

    /// Returns the waits before retries `1..=retries`.
    #[must_use]
    pub fn schedule(&self, retries: u32) -> Vec<Duration> {
        (1..=retries).map(|n| self.delay(n)).collect()
    }

    /// Returns the cumulative wait across retries `1..=retries`.
    #[must_use]
    pub fn total_wait(&self, retries: u32) -> Duration {
        (1..=retries).fold(Duration::ZERO, |acc, n| acc.saturating_add(self.delay(n)))
    }
}
