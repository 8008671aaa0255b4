//! Step-level retry policy and per-invocation retry state.

use super::backoff::BackoffPolicy;
use crate::errors::ErrorKind;
use std::collections::HashSet;
use std::time::Duration;

/// Default number of re-attempts after the first call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between step attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retry configuration bound to a step when the pipeline is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRetryPolicy {
    /// Error kinds eligible for another attempt. Terminal kinds are never
    /// retried, even when listed here.
    pub retryable_kinds: HashSet<ErrorKind>,
    /// Re-attempts allowed after the first call.
    pub max_retries: u32,
    /// Wait schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Optional wall-clock limit for a single attempt.
    pub time_limit: Option<Duration>,
}

impl Default for StepRetryPolicy {
    fn default() -> Self {
        Self::retry_all()
    }
}

impl StepRetryPolicy {
    /// Retries explicitly retryable and unclassified errors.
    #[must_use]
    pub fn retry_all() -> Self {
        Self {
            retryable_kinds: [ErrorKind::Retryable, ErrorKind::Unclassified]
                .into_iter()
                .collect(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::step(DEFAULT_RETRY_DELAY),
            time_limit: None,
        }
    }

    /// Retries only errors explicitly tagged [`ErrorKind::Retryable`].
    #[must_use]
    pub fn retry_explicit_only() -> Self {
        Self {
            retryable_kinds: std::iter::once(ErrorKind::Retryable).collect(),
            ..Self::retry_all()
        }
    }

    /// Never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            retryable_kinds: HashSet::new(),
            max_retries: 0,
            ..Self::retry_all()
        }
    }

    /// Sets the maximum number of re-attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay, keeping the exponential shape.
    #[must_use]
    pub fn with_retry_delay(mut self, base: Duration) -> Self {
        self.backoff = BackoffPolicy::step(base).with_max_delay(self.backoff.max_delay);
        self
    }

    /// Replaces the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets a per-attempt time limit.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Returns true if errors of `kind` may be retried under this policy.
    #[must_use]
    pub fn retries(&self, kind: ErrorKind) -> bool {
        !kind.is_terminal() && self.retryable_kinds.contains(&kind)
    }
}

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-invoke the body after the given delay.
    RetryAfter(Duration),
    /// The error is retryable but the budget is spent.
    Exhausted,
    /// The error must not be retried.
    Terminal,
}

/// Retry bookkeeping for one step invocation.
///
/// Owned by the executor and discarded when the step completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Number of failed attempts so far.
    pub attempt: u32,
    /// Kind of the most recent failure.
    pub last_error: Option<ErrorKind>,
    /// Delay before the next attempt.
    pub next_delay: Duration,
    /// Set once the retry budget is spent.
    pub exhausted: bool,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt and decides what happens next.
    pub fn record_failure(&mut self, kind: ErrorKind, policy: &StepRetryPolicy) -> RetryDecision {
        self.last_error = Some(kind);
        self.next_delay = Duration::ZERO;

        if !policy.retries(kind) {
            return RetryDecision::Terminal;
        }

        self.attempt += 1;
        if self.attempt > policy.max_retries {
            self.exhausted = true;
            return RetryDecision::Exhausted;
        }

        self.next_delay = policy.backoff.delay(self.attempt);
        RetryDecision::RetryAfter(self.next_delay)
    }

    /// Number of body invocations made so far, counting the one in flight.
    ///
    /// Once exhausted there is no invocation in flight and every counted
    /// failure was an invocation.
    #[must_use]
    pub const fn invocations(&self) -> u32 {
        if self.exhausted {
            self.attempt
        } else {
            self.attempt + 1
        }
    }

    /// Resets the state after a successful attempt.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
