//! Scripted steps and samplers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::context::StepContext;
use crate::errors::{ErrorKind, StepError};
use crate::progress::{ProgressSample, ProgressSampler};
use crate::steps::{Step, StepResult};

/// One scripted result of a [`ScriptedStep`] invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// Return this value.
    Ok(serde_json::Value),
    /// Fail with this kind and message.
    Fail(ErrorKind, String),
}

impl ScriptedOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn ok(value: serde_json::Value) -> Self {
        Self::Ok(value)
    }

    /// A failing outcome.
    #[must_use]
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Fail(kind, message.into())
    }

    fn to_result(&self) -> StepResult {
        match self {
            Self::Ok(value) => Ok(value.clone()),
            Self::Fail(kind, message) => Err(StepError::new(*kind, message.clone())),
        }
    }
}

/// A step that plays back a fixed list of outcomes.
///
/// Invocation `n` returns outcome `n`; once the script runs out the last
/// outcome repeats. An empty script succeeds with `null`. Every invocation is
/// timestamped with the tokio clock so tests running on a paused clock can
/// check backoff gaps.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    script: Vec<ScriptedOutcome>,
    latency: Option<Duration>,
    calls: Mutex<Vec<Instant>>,
    attempts_seen: Mutex<Vec<u32>>,
}

impl ScriptedStep {
    /// Creates a scripted step.
    #[must_use]
    pub fn new(name: impl Into<String>, script: Vec<ScriptedOutcome>) -> Self {
        Self {
            name: name.into(),
            script,
            latency: None,
            calls: Mutex::new(Vec::new()),
            attempts_seen: Mutex::new(Vec::new()),
        }
    }

    /// A step that always succeeds with `value`.
    #[must_use]
    pub fn succeeding(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(name, vec![ScriptedOutcome::ok(value)])
    }

    /// A step that always fails with `kind`.
    #[must_use]
    pub fn failing(name: impl Into<String>, kind: ErrorKind, message: &str) -> Self {
        Self::new(name, vec![ScriptedOutcome::fail(kind, message)])
    }

    /// Makes every invocation sleep before returning.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Start time of each invocation.
    #[must_use]
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    /// The context attempt number observed by each invocation.
    #[must_use]
    pub fn attempts_seen(&self) -> Vec<u32> {
        self.attempts_seen.lock().clone()
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> StepResult {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            calls.len() - 1
        };
        self.attempts_seen.lock().push(ctx.attempt());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.script.get(index).or_else(|| self.script.last()) {
            Some(outcome) => outcome.to_result(),
            None => Ok(serde_json::Value::Null),
        }
    }
}

/// A sampler that fails on every call.
#[derive(Debug, Default)]
pub struct FailingSampler {
    calls: AtomicUsize,
}

impl FailingSampler {
    /// Creates a failing sampler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the sampler was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressSampler for FailingSampler {
    async fn sample(&self) -> anyhow::Result<ProgressSample> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        anyhow::bail!("sampler failure #{n}")
    }
}
