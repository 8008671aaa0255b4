//! Per-step and per-run outcome records.

use super::StepStatus;
use crate::progress::ProgressSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What happened to one step during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name.
    pub name: String,
    /// Final status.
    pub status: StepStatus,
    /// Number of times the body was invoked. Zero for steps never reached.
    pub attempts: u32,
    /// Wall-clock time spent in the step, including backoff waits.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// The step's result when it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// The last progress sample reported, kept on failure for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress: Option<ProgressSample>,
}

impl StepRecord {
    /// A record for a step that has not run.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            attempts: 0,
            duration: Duration::ZERO,
            output: None,
            last_progress: None,
        }
    }
}

/// Overall state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every step succeeded.
    Completed,
    /// A step failed terminally.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(crate::utils::duration_ms(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
