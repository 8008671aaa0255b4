//! Error types for dsflow.
//!
//! Step bodies report failures as [`StepError`], tagged with an [`ErrorKind`]
//! from a closed taxonomy. The step executor inspects the tag to decide whether
//! another attempt is made, and turns the final error of a step into a
//! [`StepFailure`] once it gives up.

use crate::api::ApiError;
use crate::process::CommandError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Boxed error source carried by [`StepError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient failure, safe to re-attempt.
    Retryable,
    /// The dataset failed a validation rule. Never retried.
    TerminalValidation,
    /// The dataset failed structural inspection. Never retried.
    TerminalInspection,
    /// Unexpected failure. Retried when the step's policy allows it.
    Unclassified,
}

impl ErrorKind {
    /// Returns true for kinds that describe the dataset itself and can never
    /// succeed on a re-attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TerminalValidation | Self::TerminalInspection)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::TerminalValidation => write!(f, "terminal_validation"),
            Self::TerminalInspection => write!(f, "terminal_inspection"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Error returned by a step body.
///
/// Conversions from the library's own error types (and from `io`, `serde_json`
/// and `anyhow` errors) produce [`ErrorKind::Unclassified`], so `?` inside a
/// step body falls back to the executor's default handling.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    /// The failure classification.
    pub kind: ErrorKind,
    /// Human readable description.
    pub message: String,
    #[source]
    source: Option<BoxError>,
}

impl StepError {
    /// Creates a new step error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a retryable error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    /// Wraps an arbitrary error as retryable.
    #[must_use]
    pub fn retryable_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::retryable(err.to_string()).with_source(err)
    }

    /// Creates a validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TerminalValidation, message)
    }

    /// Creates an inspection failure.
    #[must_use]
    pub fn inspection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TerminalInspection, message)
    }

    /// Creates an unclassified error.
    #[must_use]
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.source = Some(source.into());
        self
    }

    fn unclassified_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::unclassified(err.to_string()).with_source(err)
    }
}

impl From<ApiError> for StepError {
    fn from(err: ApiError) -> Self {
        Self::unclassified_from(err)
    }
}

impl From<CommandError> for StepError {
    fn from(err: CommandError) -> Self {
        Self::unclassified_from(err)
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::unclassified_from(err)
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::unclassified_from(err)
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::unclassified(format!("{err:#}")).with_source(err)
    }
}

/// Serialisable classification of a terminal step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    /// Dataset content failed validation.
    Validation,
    /// Dataset failed structural inspection.
    Inspection,
    /// Retry budget exhausted.
    Infrastructure,
    /// An error outside the step's retryable set.
    Unrecoverable,
    /// The run was cancelled.
    Cancelled,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Inspection => write!(f, "inspection"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Unrecoverable => write!(f, "unrecoverable"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal outcome of a step. No further attempt will be made.
#[derive(Debug, Error)]
pub enum StepFailure {
    /// The dataset failed a validation rule.
    #[error("step '{step}' failed validation: {error}")]
    Validation {
        /// Step name.
        step: String,
        /// The error raised by the body.
        #[source]
        error: StepError,
    },

    /// The dataset failed structural inspection.
    #[error("step '{step}' failed inspection: {error}")]
    Inspection {
        /// Step name.
        step: String,
        /// The error raised by the body.
        #[source]
        error: StepError,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("step '{step}' gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Step name.
        step: String,
        /// Number of times the body was invoked.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last_error: StepError,
    },

    /// The error kind is not in the step's retryable set.
    #[error("step '{step}' failed: {error}")]
    NotRetryable {
        /// Step name.
        step: String,
        /// The error raised by the body.
        #[source]
        error: StepError,
    },

    /// The run was cancelled while the step was running or waiting.
    #[error("step '{step}' cancelled: {reason}")]
    Cancelled {
        /// Step name.
        step: String,
        /// Cancellation reason.
        reason: String,
    },
}

impl StepFailure {
    /// Builds the terminal failure for an error the executor will not retry.
    #[must_use]
    pub fn from_error(step: impl Into<String>, error: StepError) -> Self {
        let step = step.into();
        match error.kind {
            ErrorKind::TerminalValidation => Self::Validation { step, error },
            ErrorKind::TerminalInspection => Self::Inspection { step, error },
            ErrorKind::Retryable | ErrorKind::Unclassified => Self::NotRetryable { step, error },
        }
    }

    /// Returns the terminal classification.
    #[must_use]
    pub const fn kind(&self) -> TerminalKind {
        match self {
            Self::Validation { .. } => TerminalKind::Validation,
            Self::Inspection { .. } => TerminalKind::Inspection,
            Self::Exhausted { .. } => TerminalKind::Infrastructure,
            Self::NotRetryable { .. } => TerminalKind::Unrecoverable,
            Self::Cancelled { .. } => TerminalKind::Cancelled,
        }
    }

    /// Returns the name of the failed step.
    #[must_use]
    pub fn step(&self) -> &str {
        match self {
            Self::Validation { step, .. }
            | Self::Inspection { step, .. }
            | Self::Exhausted { step, .. }
            | Self::NotRetryable { step, .. }
            | Self::Cancelled { step, .. } => step,
        }
    }

    /// Returns the underlying step error, if the failure carries one.
    #[must_use]
    pub const fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::Validation { error, .. }
            | Self::Inspection { error, .. }
            | Self::NotRetryable { error, .. } => Some(error),
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::Cancelled { .. } => None,
        }
    }

    /// Returns the serialisable record kept in a pipeline's final state.
    #[must_use]
    pub fn record(&self) -> TerminalErrorRecord {
        TerminalErrorRecord {
            step: self.step().to_string(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// The single terminal error recorded for a failed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalErrorRecord {
    /// The failed step.
    pub step: String,
    /// Terminal classification.
    pub kind: TerminalKind,
    /// Rendered error message.
    pub message: String,
}

/// Error raised when a pipeline definition is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// The main error type for dsflow operations outside step bodies.
#[derive(Debug, Error)]
pub enum DsflowError {
    /// A pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A metadata API call failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// A local command failed.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// Logging could not be initialised.
    #[error("logging init failed: {0}")]
    Logging(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
