//! Retry-aware execution of a single step.

use super::retry::{RetryDecision, RetryState, StepRetryPolicy};
use crate::cancellation::CancellationToken;
use crate::context::StepContext;
use crate::errors::{StepError, StepFailure};
use crate::events::types;
use crate::steps::{Step, StepResult};
use crate::utils::duration_ms;
use tracing::{debug, error, warn};

/// Runs a step body under its retry policy.
///
/// The body is invoked at most `max_retries + 1` times. Attempts are strictly
/// sequential: the next one starts only after the previous failure has been
/// classified and its backoff delay has elapsed. Terminal error kinds end the
/// loop on first occurrence. Cancellation of the run's token interrupts both
/// a running body and a backoff wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepExecutor;

impl StepExecutor {
    /// Creates an executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Executes `step` until it succeeds or fails terminally.
    ///
    /// On return, `ctx.attempt()` holds the number of invocations made.
    pub async fn execute(
        &self,
        step: &dyn Step,
        policy: &StepRetryPolicy,
        ctx: &StepContext,
    ) -> Result<serde_json::Value, StepFailure> {
        let name = step.name();
        let token = ctx.cancellation();
        let mut state = RetryState::new();
        ctx.set_attempt(0);

        loop {
            let attempt = state.invocations();
            // counted only once the body is polled
            let body = async {
                ctx.set_attempt(attempt);
                debug!(step = %name, dataset_id = %ctx.dataset_id(), attempt, "invoking step");
                invoke(step, policy, ctx).await
            };

            let Some(outcome) = token.run_until_cancelled(body).await else {
                return Err(cancelled(name, token));
            };

            let err = match outcome {
                Ok(value) => {
                    state.reset();
                    return Ok(value);
                }
                Err(err) => err,
            };

            match state.record_failure(err.kind, policy) {
                RetryDecision::RetryAfter(delay) => {
                    let delay_ms = duration_ms(delay);
                    warn!(
                        step = %name,
                        dataset_id = %ctx.dataset_id(),
                        attempt,
                        delay_ms,
                        kind = %err.kind,
                        "step attempt failed, retrying: {}",
                        err.message
                    );
                    ctx.try_emit_event(
                        types::STEP_RETRY_SCHEDULED,
                        Some(serde_json::json!({
                            "attempt": attempt,
                            "next_attempt": attempt + 1,
                            "delay_ms": delay_ms,
                            "error_kind": err.kind,
                            "error": err.message,
                        })),
                    );
                    if !token.sleep(delay).await {
                        return Err(cancelled(name, token));
                    }
                }
                RetryDecision::Exhausted => {
                    error!(
                        step = %name,
                        dataset_id = %ctx.dataset_id(),
                        attempts = attempt,
                        "step gave up: {}",
                        err
                    );
                    return Err(StepFailure::Exhausted {
                        step: name.to_string(),
                        attempts: attempt,
                        last_error: err,
                    });
                }
                RetryDecision::Terminal => {
                    error!(
                        step = %name,
                        dataset_id = %ctx.dataset_id(),
                        attempt,
                        kind = %err.kind,
                        "step failed terminally: {}",
                        err.message
                    );
                    return Err(StepFailure::from_error(name, err));
                }
            }
        }
    }
}

async fn invoke(step: &dyn Step, policy: &StepRetryPolicy, ctx: &StepContext) -> StepResult {
    match policy.time_limit {
        Some(limit) => tokio::time::timeout(limit, step.execute(ctx))
            .await
            .unwrap_or_else(|_| {
                Err(StepError::unclassified(format!(
                    "time limit of {limit:?} exceeded"
                )))
            }),
        None => step.execute(ctx).await,
    }
}

fn cancelled(step: &str, token: &CancellationToken) -> StepFailure {
    StepFailure::Cancelled {
        step: step.to_string(),
        reason: token.reason().unwrap_or_else(|| "cancelled".to_string()),
    }
}
