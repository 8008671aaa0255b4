//! Step status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a step within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet invoked. Steps after a terminal failure stay pending.
    #[default]
    Pending,
    /// The body is running or waiting out a backoff.
    Running,
    /// The body returned a result.
    Ok,
    /// The step failed terminally.
    Fail,
    /// The run was cancelled while the step was active.
    Cancel,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Fail | Self::Cancel)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Cancel)
    }
}
