//! Context handed to a step body.

use super::RunIdentity;
use crate::cancellation::CancellationToken;
use crate::events::{types, EventSink, NoOpEventSink};
use crate::progress::ProgressSample;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Keyword arguments passed to every step of a run.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;

/// Shared holder of the most recent progress sample of a step.
pub(crate) type ProgressSlot = Arc<Mutex<Option<ProgressSample>>>;

/// The context for one step invocation.
///
/// Holds the run identity, the run's keyword arguments, the results of the
/// steps that already completed, and the run's event sink and cancellation
/// token. The executor updates the attempt number before each invocation.
pub struct StepContext {
    identity: Arc<RunIdentity>,
    step_name: String,
    kwargs: Arc<Kwargs>,
    outputs: HashMap<String, serde_json::Value>,
    attempt: AtomicU32,
    event_sink: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
    last_progress: ProgressSlot,
}

impl StepContext {
    /// Creates a context with no kwargs, a no-op sink and a fresh token.
    #[must_use]
    pub fn new(identity: Arc<RunIdentity>, step_name: impl Into<String>) -> Self {
        Self {
            identity,
            step_name: step_name.into(),
            kwargs: Arc::new(Kwargs::new()),
            outputs: HashMap::new(),
            attempt: AtomicU32::new(1),
            event_sink: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
            last_progress: ProgressSlot::default(),
        }
    }

    /// Sets the keyword arguments.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: Arc<Kwargs>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Sets the results of earlier steps.
    #[must_use]
    pub fn with_outputs(mut self, outputs: HashMap<String, serde_json::Value>) -> Self {
        self.outputs = outputs;
        self
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

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &Arc<RunIdentity> {
        &self.identity
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.identity.pipeline
    }

    /// Returns the dataset ID.
    #[must_use]
    pub fn dataset_id(&self) -> &str {
        &self.identity.dataset_id
    }

    /// Returns the step name.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Returns the keyword arguments.
    #[must_use]
    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Returns one keyword argument.
    #[must_use]
    pub fn kwarg(&self, key: &str) -> Option<&serde_json::Value> {
        self.kwargs.get(key)
    }

    /// Returns the result of an earlier step.
    #[must_use]
    pub fn output(&self, step: &str) -> Option<&serde_json::Value> {
        self.outputs.get(step)
    }

    /// Returns the 1-based number of the current invocation.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    pub(crate) fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::SeqCst);
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Returns whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Emits an event annotated with the run and step identity.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = data.unwrap_or_else(|| serde_json::json!({}));
        if let serde_json::Value::Object(ref mut map) = enriched {
            self.identity.annotate(map);
            map.insert("step".to_string(), serde_json::json!(&self.step_name));
        }
        self.event_sink.try_emit(event_type, Some(enriched));
    }

    /// Publishes a progress sample for this step and keeps it as the
    /// latest one.
    pub fn report_progress(&self, sample: &ProgressSample) {
        *self.last_progress.lock() = Some(sample.clone());
        self.try_emit_event(types::STEP_PROGRESS, Some(sample.to_event_data()));
    }

    /// Returns the most recent sample reported for this step, from the body
    /// or from a progress reporter.
    #[must_use]
    pub fn last_progress(&self) -> Option<ProgressSample> {
        self.last_progress.lock().clone()
    }

    pub(crate) fn progress_slot(&self) -> ProgressSlot {
        Arc::clone(&self.last_progress)
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("identity", &self.identity)
            .field("step_name", &self.step_name)
            .field("attempt", &self.attempt())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
