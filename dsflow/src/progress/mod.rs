//! Progress reporting for long-running steps.
//!
//! A [`ProgressReporter`] runs next to a step body in its own task and
//! periodically publishes [`ProgressSample`]s taken by a [`ProgressSampler`].

mod reporter;
mod sample;
mod sampler;

pub use reporter::{ProgressHandle, ProgressReporter, ProgressSummary, DEFAULT_PROGRESS_INTERVAL};
pub use sample::{ProgressSample, BYTES};
pub use sampler::{DirectoryProgress, FileProgress, FnSampler, ProgressSampler};
