//! # Dsflow
//!
//! Retry-aware execution of dataset lifecycle pipelines.
//!
//! A dataset moves through steps such as inspect, archive, stage and
//! validate. Each step talks to slow and unreliable collaborators, so dsflow
//! provides:
//!
//! - **Two-tier retry**: the API client retries transient network failures
//!   below the step, and the step executor retries whole-step failures
//!   according to a closed failure taxonomy
//! - **Deterministic backoff**: one capped exponential schedule shared by both tiers
//! - **Progress side-channel**: samplers report on long-running steps from
//!   their own task without blocking the step body
//! - **Cancellation**: backoff waits, request retries and progress reporters
//!   all end promptly when a run is cancelled
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dsflow::prelude::*;
//!
//! let registry = StepRegistry::new()
//!     .with_step(Arc::new(StageDataset::new(api.clone())))
//!     .with_step(Arc::new(ValidateDataset::new(api)));
//! let pipeline = registry.workflow("stage")?;
//!
//! let result = pipeline.run("42", Kwargs::new(), &RunOptions::new()).await;
//! if let Some(error) = result.error_record() {
//!     eprintln!("{} failed: {}", error.step, error.message);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod steps;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{ApiClient, ApiError, Dataset};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::Config;
    pub use crate::context::{Kwargs, RunIdentity, StepContext};
    pub use crate::core::{PipelineStatus, StepRecord, StepStatus};
    pub use crate::errors::{
        DsflowError, ErrorKind, PipelineValidationError, StepError, StepFailure, TerminalKind,
    };
    pub use crate::events::{ChannelEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        BackoffPolicy, Pipeline, PipelineBuilder, PipelineResult, RunOptions, StepExecutor,
        StepRegistry, StepRetryPolicy,
    };
    pub use crate::progress::{ProgressReporter, ProgressSample, ProgressSampler};
    pub use crate::steps::{FnStep, Step, StepResult};
}
