//! Step trait and closure adapter.
//!
//! Steps are the units of work in a dataset pipeline. A step body returns a
//! JSON result or a [`StepError`] tagged with its [`ErrorKind`](crate::errors::ErrorKind).

use crate::context::StepContext;
use crate::errors::StepError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// Result type of a step body.
pub type StepResult = Result<serde_json::Value, StepError>;

/// Trait for pipeline steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Executes the step body once.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The step execution context
    async fn execute(&self, ctx: &StepContext) -> StepResult;
}

/// A step backed by an async closure.
pub struct FnStep<F>
where
    F: for<'a> Fn(&'a StepContext) -> BoxFuture<'a, StepResult> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: for<'a> Fn(&'a StepContext) -> BoxFuture<'a, StepResult> + Send + Sync,
{
    /// Creates a closure-backed step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: for<'a> Fn(&'a StepContext) -> BoxFuture<'a, StepResult> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: for<'a> Fn(&'a StepContext) -> BoxFuture<'a, StepResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> StepResult {
        (self.func)(ctx).await
    }
}

/// A step that succeeds with `null`.
#[derive(Debug, Clone)]
pub struct NoOpStep {
    name: String,
}

impl NoOpStep {
    /// Creates a new no-op step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for NoOpStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StepContext) -> StepResult {
        Ok(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunIdentity;
    use crate::errors::ErrorKind;
    use std::sync::Arc;

    fn ctx(step: &str) -> StepContext {
        StepContext::new(Arc::new(RunIdentity::new("test", "ds-1")), step)
    }

    #[tokio::test]
    async fn test_fn_step_sees_context() {
        let step = FnStep::new("echo", |ctx: &StepContext| {
            Box::pin(async move { Ok(serde_json::json!({"dataset": ctx.dataset_id()})) })
        });

        assert_eq!(step.name(), "echo");
        let out = step.execute(&ctx("echo")).await.unwrap();
        assert_eq!(out, serde_json::json!({"dataset": "ds-1"}));
    }

    #[tokio::test]
    async fn test_fn_step_error() {
        let step = FnStep::new("bad", |_ctx: &StepContext| {
            Box::pin(async { Err(StepError::validation("missing files")) })
        });
        let err = step.execute(&ctx("bad")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TerminalValidation);
    }

    #[tokio::test]
    async fn test_noop_step() {
        let step = NoOpStep::new("noop");
        assert_eq!(step.execute(&ctx("noop")).await.unwrap(), serde_json::Value::Null);
    }
}
