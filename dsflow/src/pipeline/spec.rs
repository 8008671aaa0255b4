//! Step specifications.

use super::retry::StepRetryPolicy;
use crate::errors::PipelineValidationError;
use crate::steps::Step;
use std::sync::Arc;

/// A step bound to its retry policy.
#[derive(Debug, Clone)]
pub struct StepSpec {
    /// The step implementation.
    pub step: Arc<dyn Step>,
    /// How failures of the step are retried.
    pub policy: StepRetryPolicy,
}

impl StepSpec {
    /// Creates a new step specification.
    #[must_use]
    pub fn new(step: Arc<dyn Step>, policy: StepRetryPolicy) -> Self {
        Self { step, policy }
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.step.name()
    }

    /// Validates the step specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the step name is empty or whitespace-only.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name().trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Step name cannot be empty or whitespace-only",
            ));
        }
        Ok(())
    }
}
