//! Sequential pipeline execution.

use super::executor::StepExecutor;
use super::spec::StepSpec;
use crate::cancellation::CancellationToken;
use crate::context::{Kwargs, RunIdentity, StepContext};
use crate::core::{PipelineStatus, StepRecord, StepStatus};
use crate::errors::{PipelineValidationError, StepFailure, TerminalErrorRecord};
use crate::events::{types, EventSink, NoOpEventSink};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Per-run collaborators.
#[derive(Clone)]
pub struct RunOptions {
    /// Receives lifecycle, retry and progress events.
    pub event_sink: Arc<dyn EventSink>,
    /// Cancels the run, including in-flight backoff waits.
    pub cancellation: Arc<CancellationToken>,
    /// Run ID to reuse; a fresh one is generated when absent.
    pub run_id: Option<Uuid>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            event_sink: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
            run_id: None,
        }
    }
}

impl RunOptions {
    /// Creates options with a no-op sink and a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Reuses an existing run ID.
    #[must_use]
    pub const fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("cancellation", &self.cancellation)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// Outcome of one step.
#[derive(Debug)]
pub struct StepRun {
    /// What happened, for reporting.
    pub record: StepRecord,
    /// The terminal failure, if the step failed.
    pub error: Option<StepFailure>,
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    /// Run ID.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Dataset the run operated on.
    pub dataset_id: String,
    /// Overall status.
    pub status: PipelineStatus,
    /// One record per declared step, in order. Steps after a failure stay pending.
    pub steps: Vec<StepRecord>,
    /// The single terminal failure of a failed or cancelled run.
    pub error: Option<StepFailure>,
}

impl PipelineResult {
    /// Returns true if every step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    /// Returns the record of step `name`.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.name == name)
    }

    /// Returns the output of step `name`, if it succeeded.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.step(name).and_then(|r| r.output.as_ref())
    }

    /// Returns the serialisable form of the terminal error.
    #[must_use]
    pub fn error_record(&self) -> Option<TerminalErrorRecord> {
        self.error.as_ref().map(StepFailure::record)
    }
}

/// An ordered list of steps, each bound to its retry policy.
///
/// Built with [`PipelineBuilder`](super::PipelineBuilder).
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<StepSpec>,
    executor: StepExecutor,
}

impl Pipeline {
    pub(crate) fn new(name: String, steps: Vec<StepSpec>) -> Self {
        Self {
            name,
            steps,
            executor: StepExecutor::new(),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(StepSpec::name).collect()
    }

    /// Returns the specification of step `name`.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Runs every step in order over `dataset_id`.
    ///
    /// Each step sees the outputs of the steps before it. The first terminal
    /// failure halts the run. Completed steps are not rolled back.
    pub async fn run(
        &self,
        dataset_id: impl Into<String>,
        kwargs: Kwargs,
        options: &RunOptions,
    ) -> PipelineResult {
        let identity = Arc::new(self.identity(dataset_id.into(), options));
        let kwargs = Arc::new(kwargs);
        info!(
            pipeline = %self.name,
            dataset_id = %identity.dataset_id,
            run_id = %identity.run_id,
            steps = self.steps.len(),
            "pipeline started"
        );
        emit(options, &identity, types::PIPELINE_STARTED, json!({"steps": self.step_names()}));

        let mut records: Vec<StepRecord> =
            self.steps.iter().map(|s| StepRecord::pending(s.name())).collect();
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut failure = None;

        for (index, spec) in self.steps.iter().enumerate() {
            let ctx = context(&identity, spec.name(), &kwargs, outputs.clone(), options);
            let run = self.execute(spec, &ctx).await;
            if let Some(output) = &run.record.output {
                outputs.insert(spec.name().to_string(), output.clone());
            }
            records[index] = run.record;
            if run.error.is_some() {
                failure = run.error;
                break;
            }
        }

        let status = match &failure {
            None => PipelineStatus::Completed,
            Some(StepFailure::Cancelled { .. }) => PipelineStatus::Cancelled,
            Some(_) => PipelineStatus::Failed,
        };
        match &failure {
            None => {
                info!(pipeline = %self.name, dataset_id = %identity.dataset_id, "pipeline completed");
                emit(options, &identity, types::PIPELINE_COMPLETED, json!({"status": status}));
            }
            Some(failure) => {
                error!(
                    pipeline = %self.name,
                    dataset_id = %identity.dataset_id,
                    step = %failure.step(),
                    %status,
                    "pipeline halted: {failure}"
                );
                emit(
                    options,
                    &identity,
                    types::PIPELINE_FAILED,
                    json!({"status": status, "error": failure.record()}),
                );
            }
        }

        PipelineResult {
            run_id: identity.run_id,
            pipeline: self.name.clone(),
            dataset_id: identity.dataset_id.clone(),
            status,
            steps: records,
            error: failure,
        }
    }

    /// Runs the single step `name`.
    ///
    /// Used when the worker substrate delivers steps of one run separately;
    /// `outputs` carries the results of the steps that ran before.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no step called `name`.
    pub async fn run_step(
        &self,
        name: &str,
        dataset_id: impl Into<String>,
        kwargs: Kwargs,
        outputs: HashMap<String, Value>,
        options: &RunOptions,
    ) -> Result<StepRun, PipelineValidationError> {
        let spec = self.spec(name).ok_or_else(|| {
            PipelineValidationError::new(format!(
                "Pipeline '{}' has no step '{name}'",
                self.name
            ))
            .with_steps(vec![name.to_string()])
        })?;
        let identity = Arc::new(self.identity(dataset_id.into(), options));
        let ctx = context(&identity, name, &Arc::new(kwargs), outputs, options);
        Ok(self.execute(spec, &ctx).await)
    }

    fn identity(&self, dataset_id: String, options: &RunOptions) -> RunIdentity {
        match options.run_id {
            Some(run_id) => RunIdentity::with_run_id(run_id, self.name.clone(), dataset_id),
            None => RunIdentity::new(self.name.clone(), dataset_id),
        }
    }

    async fn execute(&self, spec: &StepSpec, ctx: &StepContext) -> StepRun {
        let started = Instant::now();
        ctx.try_emit_event(types::STEP_STARTED, None);

        let result = self.executor.execute(spec.step.as_ref(), &spec.policy, ctx).await;
        let duration = started.elapsed();
        let attempts = ctx.attempt();
        let duration_ms = crate::utils::duration_ms(duration);

        match result {
            Ok(output) => {
                ctx.try_emit_event(
                    types::STEP_COMPLETED,
                    Some(json!({"attempts": attempts, "duration_ms": duration_ms})),
                );
                StepRun {
                    record: StepRecord {
                        name: spec.name().to_string(),
                        status: StepStatus::Ok,
                        attempts,
                        duration,
                        output: Some(output),
                        last_progress: ctx.last_progress(),
                    },
                    error: None,
                }
            }
            Err(failure) => {
                let status = match failure {
                    StepFailure::Cancelled { .. } => StepStatus::Cancel,
                    _ => StepStatus::Fail,
                };
                ctx.try_emit_event(
                    types::STEP_FAILED,
                    Some(json!({
                        "attempts": attempts,
                        "duration_ms": duration_ms,
                        "error": failure.record(),
                    })),
                );
                StepRun {
                    record: StepRecord {
                        name: spec.name().to_string(),
                        status,
                        attempts,
                        duration,
                        output: None,
                        last_progress: ctx.last_progress(),
                    },
                    error: Some(failure),
                }
            }
        }
    }
}

fn context(
    identity: &Arc<RunIdentity>,
    step: &str,
    kwargs: &Arc<Kwargs>,
    outputs: HashMap<String, Value>,
    options: &RunOptions,
) -> StepContext {
    StepContext::new(Arc::clone(identity), step)
        .with_kwargs(Arc::clone(kwargs))
        .with_outputs(outputs)
        .with_event_sink(Arc::clone(&options.event_sink))
        .with_cancellation(Arc::clone(&options.cancellation))
}

fn emit(options: &RunOptions, identity: &RunIdentity, event_type: &str, mut data: Value) {
    if let Value::Object(map) = &mut data {
        identity.annotate(map);
    }
    options.event_sink.try_emit(event_type, Some(data));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, StepError, TerminalKind};
    use crate::events::CollectingEventSink;
    use crate::progress::ProgressSample;
    use crate::pipeline::{PipelineBuilder, StepRetryPolicy};
    use crate::steps::{FnStep, Step};
    use crate::testing::{ScriptedOutcome, ScriptedStep};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    mockall::mock! {
        Sink {}

        #[async_trait]
        impl EventSink for Sink {
            async fn emit(&self, event_type: &str, data: Option<Value>);
            fn try_emit(&self, event_type: &str, data: Option<Value>);
        }
    }

    fn scripted(name: &str, outcomes: Vec<ScriptedOutcome>) -> Arc<ScriptedStep> {
        Arc::new(ScriptedStep::new(name, outcomes))
    }

    #[tokio::test(start_paused = true)]
    async fn test_outputs_flow_to_later_steps() {
        let archive = scripted("archive_dataset", vec![ScriptedOutcome::ok(json!({"path": "/a.tar"}))]);
        let stage = Arc::new(FnStep::new("stage_dataset", |ctx: &StepContext| {
            Box::pin(async move {
                let archive = ctx.output("archive_dataset").cloned().unwrap_or(Value::Null);
                Ok(json!({"from": archive["path"], "dataset": ctx.dataset_id()}))
            })
        }));
        let pipeline = PipelineBuilder::new("integrated")
            .step(archive, StepRetryPolicy::retry_all())
            .step(stage, StepRetryPolicy::retry_all())
            .build()
            .unwrap();

        let result = pipeline.run("42", Kwargs::new(), &RunOptions::new()).await;

        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(
            result.output("stage_dataset"),
            Some(&json!({"from": "/a.tar", "dataset": "42"}))
        );
        assert_eq!(result.step("archive_dataset").unwrap().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_halts_and_later_steps_stay_pending() {
        let inspect = scripted(
            "inspect_dataset",
            vec![ScriptedOutcome::fail(ErrorKind::TerminalInspection, "no files")],
        );
        let archive = scripted("archive_dataset", vec![]);
        let pipeline = PipelineBuilder::new("integrated")
            .step(inspect.clone(), StepRetryPolicy::retry_all())
            .step(archive.clone(), StepRetryPolicy::retry_all())
            .build()
            .unwrap();

        let result = pipeline.run("42", Kwargs::new(), &RunOptions::new()).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.steps[0].status, StepStatus::Fail);
        assert_eq!(result.steps[1].status, StepStatus::Pending);
        assert_eq!(archive.call_count(), 0);
        let record = result.error_record().unwrap();
        assert_eq!(record.step, "inspect_dataset");
        assert_eq!(record.kind, TerminalKind::Inspection);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_keeps_last_progress() {
        let archive = Arc::new(FnStep::new("archive_dataset", |ctx: &StepContext| {
            Box::pin(async move {
                ctx.report_progress(&ProgressSample::new("archive", 512, Some(1024)));
                Err::<Value, _>(StepError::validation("tarball checksum mismatch"))
            })
        }));
        let pipeline = PipelineBuilder::new("integrated")
            .step(archive, StepRetryPolicy::retry_all())
            .build()
            .unwrap();

        let result = pipeline.run("42", Kwargs::new(), &RunOptions::new()).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        let record = result.step("archive_dataset").unwrap();
        assert_eq!(record.status, StepStatus::Fail);
        assert_eq!(
            record.last_progress,
            Some(ProgressSample::new("archive", 512, Some(1024)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_step_records_attempts() {
        let stage = scripted(
            "stage_dataset",
            vec![ScriptedOutcome::fail(ErrorKind::Retryable, "nfs timeout")],
        );
        let pipeline = PipelineBuilder::new("stage")
            .step(stage.clone(), StepRetryPolicy::retry_all().with_max_retries(2))
            .build()
            .unwrap();

        let result = pipeline.run("7", Kwargs::new(), &RunOptions::new()).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.steps[0].attempts, 3);
        assert_eq!(result.steps[0].duration, Duration::from_secs(15));
        assert_eq!(result.error.unwrap().kind(), TerminalKind::Infrastructure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_marks_run_cancelled() {
        let stage = scripted(
            "stage_dataset",
            vec![ScriptedOutcome::fail(ErrorKind::Retryable, "busy")],
        );
        let validate = scripted("validate_dataset", vec![]);
        let pipeline = PipelineBuilder::new("stage")
            .step(stage, StepRetryPolicy::retry_all())
            .step(validate.clone(), StepRetryPolicy::retry_all())
            .build()
            .unwrap();
        let token = Arc::new(CancellationToken::new());
        let options = RunOptions::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel("worker shutdown");
        });
        let result = pipeline.run("7", Kwargs::new(), &options).await;
        canceller.await.unwrap();

        assert_eq!(result.status, PipelineStatus::Cancelled);
        assert_eq!(result.steps[0].status, StepStatus::Cancel);
        assert_eq!(validate.call_count(), 0);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("stage")
            .step(scripted("stage_dataset", vec![]), StepRetryPolicy::retry_all())
            .step(scripted("validate_dataset", vec![]), StepRetryPolicy::retry_all())
            .build()
            .unwrap();
        let run_id = Uuid::new_v4();
        let options = RunOptions::new()
            .with_event_sink(sink.clone())
            .with_run_id(run_id);

        let result = pipeline.run("7", Kwargs::new(), &options).await;

        assert_eq!(result.run_id, run_id);
        assert_eq!(
            sink.event_types(),
            vec![
                types::PIPELINE_STARTED,
                types::STEP_STARTED,
                types::STEP_COMPLETED,
                types::STEP_STARTED,
                types::STEP_COMPLETED,
                types::PIPELINE_COMPLETED,
            ]
        );
        let started = sink.events_of_type(types::STEP_STARTED);
        let data = started[1].1.as_ref().unwrap();
        assert_eq!(data["step"], "validate_dataset");
        assert_eq!(data["run_id"], json!(run_id.to_string()));
    }

    #[tokio::test]
    async fn test_sink_sees_one_pipeline_outcome() {
        let mut sink = MockSink::new();
        sink.expect_try_emit()
            .withf(|event_type, _| event_type.to_string() == types::PIPELINE_STARTED)
            .times(1)
            .return_const(());
        sink.expect_try_emit()
            .withf(|event_type, _| event_type.starts_with("step."))
            .times(2)
            .return_const(());
        sink.expect_try_emit()
            .withf(|event_type, data| {
                event_type.to_string() == types::PIPELINE_FAILED
                    && data.as_ref().is_some_and(|d| d["error"]["kind"] == "validation")
            })
            .times(1)
            .return_const(());
        sink.expect_emit().never();

        let pipeline = PipelineBuilder::new("stage")
            .step(
                scripted(
                    "validate_dataset",
                    vec![ScriptedOutcome::fail(ErrorKind::TerminalValidation, "md5 mismatch")],
                ),
                StepRetryPolicy::retry_all(),
            )
            .build()
            .unwrap();
        let options = RunOptions::new().with_event_sink(Arc::new(sink));

        let result = pipeline.run("7", Kwargs::new(), &options).await;
        assert_eq!(result.status, PipelineStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_step() {
        let pipeline = PipelineBuilder::new("stage")
            .step(scripted("stage_dataset", vec![]), StepRetryPolicy::retry_all())
            .step(
                scripted("validate_dataset", vec![ScriptedOutcome::ok(json!(true))]),
                StepRetryPolicy::retry_all(),
            )
            .build()
            .unwrap();

        let run = pipeline
            .run_step("validate_dataset", "7", Kwargs::new(), HashMap::new(), &RunOptions::new())
            .await
            .unwrap();
        assert_eq!(run.record.status, StepStatus::Ok);
        assert_eq!(run.record.output, Some(json!(true)));

        assert!(pipeline
            .run_step("archive_dataset", "7", Kwargs::new(), HashMap::new(), &RunOptions::new())
            .await
            .is_err());
    }

    #[test]
    fn test_step_trait_object_names() {
        let step: Arc<dyn Step> = scripted("metadata", vec![]);
        assert_eq!(step.name(), "metadata");
    }
}
