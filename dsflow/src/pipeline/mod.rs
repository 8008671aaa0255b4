//! Pipeline building and execution.
//!
//! This module provides:
//! - Backoff schedules shared by the HTTP client and the step executor
//! - Step retry policies and the retry-aware step executor
//! - The step catalog and standard workflows
//! - Pipeline builder with validation and the sequential runner

mod backoff;
mod builder;
pub mod catalog;
mod executor;
mod retry;
mod runner;
mod spec;


pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF_MAX};
pub use builder::PipelineBuilder;
pub use catalog::{StepDeclaration, StepRegistry, Workflow};
pub use executor::StepExecutor;
pub use retry::{
    RetryDecision, RetryState, StepRetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
};
pub use runner::{Pipeline, PipelineResult, RunOptions, StepRun};
pub use spec::StepSpec;
