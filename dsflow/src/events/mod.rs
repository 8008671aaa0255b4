//! Event sinks for pipeline observability.
//!
//! Every component that reports on a run writes to an [`EventSink`]. The
//! event types used by the crate are listed in [`types`].

mod channel;
mod sink;

pub use channel::{ChannelEventSink, PipelineEvent};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names.
pub mod types {
    /// A pipeline run started.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// Every step of a run completed.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run halted on a terminal step failure.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A step body is about to be invoked for the first time.
    pub const STEP_STARTED: &str = "step.started";
    /// A step returned a result.
    pub const STEP_COMPLETED: &str = "step.completed";
    /// A step attempt failed and another one is scheduled.
    pub const STEP_RETRY_SCHEDULED: &str = "step.retry_scheduled";
    /// A step failed terminally.
    pub const STEP_FAILED: &str = "step.failed";
    /// A progress sample for a running step.
    pub const STEP_PROGRESS: &str = "step.progress";
}
