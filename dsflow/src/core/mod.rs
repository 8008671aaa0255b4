//! Core domain types shared by the executor and the runner.

mod record;
mod status;

pub use record::{PipelineStatus, StepRecord};
pub use status::StepStatus;
