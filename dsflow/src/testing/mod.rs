//! Testing utilities for dsflow pipelines.
//!
//! This module provides:
//! - Scripted steps with deterministic outcomes
//! - A sampler that always fails
//! - The in-memory event sink

mod mocks;

pub use crate::events::CollectingEventSink;
pub use mocks::{FailingSampler, ScriptedOutcome, ScriptedStep};
