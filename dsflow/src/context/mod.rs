//! Context management for pipeline execution.
//!
//! This module provides:
//! - The identity of a pipeline run
//! - The per-step context handed to step bodies

#[cfg(test)]
mod context_tests;
mod identity;
mod step_context;

pub use identity::RunIdentity;
pub(crate) use step_context::ProgressSlot;
pub use step_context::{Kwargs, StepContext};
