//! Pipeline builder with validation.

use super::catalog::StepRegistry;
use super::retry::StepRetryPolicy;
use super::runner::Pipeline;
use super::spec::StepSpec;
use crate::errors::PipelineValidationError;
use crate::steps::Step;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Steps run in the order they are added.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The step specifications, in execution order.
    steps: Vec<StepSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Builds a pipeline from catalog step names.
    ///
    /// Each name must be declared in the catalog and have a body in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown or unregistered step.
    pub fn from_catalog(
        name: impl Into<String>,
        registry: &StepRegistry,
        step_names: &[&str],
    ) -> Result<Self, PipelineValidationError> {
        let mut builder = Self::new(name);
        for step_name in step_names {
            builder.steps.push(registry.spec(step_name)?);
        }
        Ok(builder)
    }

    /// Appends a step with its retry policy.
    #[must_use]
    pub fn step(mut self, step: Arc<dyn Step>, policy: StepRetryPolicy) -> Self {
        self.steps.push(StepSpec::new(step, policy));
        self
    }

    /// Appends a step specification.
    #[must_use]
    pub fn add_spec(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline or a step has a blank name, the
    /// builder has no steps, or two steps share a name.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.steps.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for spec in &self.steps {
            spec.validate()?;
            if !seen.insert(spec.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Duplicate step '{}' in pipeline '{}'",
                    spec.name(),
                    self.name
                ))
                .with_steps(vec![spec.name().to_string()]));
            }
        }

        Ok(Pipeline::new(self.name, self.steps))
    }
}
