//! Declared lifecycle steps and the standard workflows built from them.
//!
//! A declaration fixes the retry behaviour of a named step. Step bodies are
//! supplied separately through a [`StepRegistry`], so the same catalog serves
//! production bodies and test doubles.

use super::builder::PipelineBuilder;
use super::retry::StepRetryPolicy;
use super::runner::Pipeline;
use super::spec::StepSpec;
use crate::config::StepDefaults;
use crate::errors::PipelineValidationError;
use crate::steps::Step;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Wall-clock limit of a batch download.
pub const TWO_DAYS: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Steps that retry any non-terminal failure.
const RETRY_ALL: [&str; 12] = [
    "archive_dataset",
    "delete_dataset",
    "download_illumina_dataset",
    "generate_qc",
    "stage_dataset",
    "await_stability",
    "delete_source",
    "mark_archived_and_delete",
    "metadata",
    // unknown errors are wrapped as retryable, terminal verdicts pass through
    "inspect_dataset",
    "validate_dataset",
    "setup_dataset_download",
];

/// Steps whose bodies classify failures themselves.
const RETRY_EXPLICIT: [&str; 2] = ["process_dataset_upload", "cancel_dataset_upload"];

/// A named step and the retry policy it runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDeclaration {
    /// Step name.
    pub name: &'static str,
    /// Retry policy.
    pub policy: StepRetryPolicy,
}

/// A standard ordered list of steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workflow {
    /// Workflow name.
    pub name: &'static str,
    /// Steps in execution order.
    pub steps: &'static [&'static str],
}

const WORKFLOWS: [Workflow; 6] = [
    Workflow {
        name: "integrated",
        steps: &[
            "await_stability",
            "inspect_dataset",
            "archive_dataset",
            "stage_dataset",
            "validate_dataset",
        ],
    },
    Workflow {
        name: "stage",
        steps: &["stage_dataset", "validate_dataset"],
    },
    Workflow {
        name: "delete",
        steps: &["delete_dataset"],
    },
    Workflow {
        name: "download",
        steps: &["setup_dataset_download"],
    },
    Workflow {
        name: "upload",
        steps: &["process_dataset_upload"],
    },
    Workflow {
        name: "cancel_upload",
        steps: &["cancel_dataset_upload"],
    },
];

/// Returns every declared step.
#[must_use]
pub fn declarations() -> Vec<StepDeclaration> {
    let retry_all = RETRY_ALL.iter().map(|&name| StepDeclaration {
        name,
        policy: StepRetryPolicy::retry_all(),
    });
    let explicit = RETRY_EXPLICIT.iter().map(|&name| StepDeclaration {
        name,
        policy: StepRetryPolicy::retry_explicit_only(),
    });
    let batch = std::iter::once(StepDeclaration {
        name: "batch_download",
        policy: StepRetryPolicy::no_retry().with_time_limit(TWO_DAYS),
    });
    retry_all.chain(explicit).chain(batch).collect()
}

/// Looks up one declaration.
#[must_use]
pub fn declaration(name: &str) -> Option<StepDeclaration> {
    declarations().into_iter().find(|d| d.name == name)
}

/// Returns the standard workflows.
#[must_use]
pub const fn workflows() -> &'static [Workflow] {
    &WORKFLOWS
}

/// Looks up a standard workflow.
#[must_use]
pub fn workflow(name: &str) -> Option<&'static Workflow> {
    WORKFLOWS.iter().find(|w| w.name == name)
}

/// Step bodies keyed by declaration name.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    bodies: HashMap<String, Arc<dyn Step>>,
    defaults: Option<StepDefaults>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies configured retry defaults to every step that retries at all.
    #[must_use]
    pub fn with_defaults(mut self, defaults: StepDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Registers a body under its step name, replacing any previous one.
    #[must_use]
    pub fn with_step(mut self, step: Arc<dyn Step>) -> Self {
        self.register(step);
        self
    }

    /// Registers a body under its step name, replacing any previous one.
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.bodies.insert(step.name().to_string(), step);
    }

    /// Returns true if a body is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bodies.contains_key(name)
    }

    /// Binds the body registered for `name` to its declared policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not declared or has no body.
    pub fn spec(&self, name: &str) -> Result<StepSpec, PipelineValidationError> {
        let declaration = declaration(name).ok_or_else(|| {
            PipelineValidationError::new(format!("Unknown step declaration '{name}'"))
                .with_steps(vec![name.to_string()])
        })?;
        let step = self.bodies.get(name).ok_or_else(|| {
            PipelineValidationError::new(format!("No body registered for step '{name}'"))
                .with_steps(vec![name.to_string()])
        })?;

        let policy = match &self.defaults {
            Some(defaults) if declaration.policy.max_retries > 0 => {
                defaults.apply(declaration.policy)
            }
            _ => declaration.policy,
        };
        Ok(StepSpec::new(Arc::clone(step), policy))
    }

    /// Builds the standard workflow `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow is unknown or one of its steps has no body.
    pub fn workflow(&self, name: &str) -> Result<Pipeline, PipelineValidationError> {
        let workflow = workflow(name).ok_or_else(|| {
            PipelineValidationError::new(format!("Unknown workflow '{name}'"))
        })?;
        PipelineBuilder::from_catalog(workflow.name, self, workflow.steps)?.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::steps::NoOpStep;
    use pretty_assertions::assert_eq;

    fn registry(names: &[&str]) -> StepRegistry {
        names.iter().fold(StepRegistry::new(), |registry, name| {
            registry.with_step(Arc::new(NoOpStep::new(*name)))
        })
    }

    #[test]
    fn test_declarations_are_unique() {
        let declarations = declarations();
        let mut names: Vec<_> = declarations.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), declarations.len());
        assert_eq!(declarations.len(), 15);
    }

    #[test]
    fn test_default_policy() {
        let archive = declaration("archive_dataset").unwrap();
        assert_eq!(archive.policy.max_retries, 3);
        assert_eq!(archive.policy.backoff.delay(1), Duration::from_secs(5));
        assert!(archive.policy.retries(ErrorKind::Unclassified));
    }

    #[test]
    fn test_terminal_verdicts_pass_through() {
        let validate = declaration("validate_dataset").unwrap();
        assert!(validate.policy.retries(ErrorKind::Unclassified));
        assert!(!validate.policy.retries(ErrorKind::TerminalValidation));

        let inspect = declaration("inspect_dataset").unwrap();
        assert!(!inspect.policy.retries(ErrorKind::TerminalInspection));
    }

    #[test]
    fn test_upload_retries_explicit_only() {
        let upload = declaration("process_dataset_upload").unwrap();
        assert!(upload.policy.retries(ErrorKind::Retryable));
        assert!(!upload.policy.retries(ErrorKind::Unclassified));
    }

    #[test]
    fn test_batch_download_never_retries() {
        let batch = declaration("batch_download").unwrap();
        assert_eq!(batch.policy.max_retries, 0);
        assert_eq!(batch.policy.time_limit, Some(TWO_DAYS));
        assert!(!batch.policy.retries(ErrorKind::Retryable));
    }

    #[test]
    fn test_workflow_steps_are_declared() {
        for workflow in workflows() {
            for step in workflow.steps {
                assert!(declaration(step).is_some(), "{} in {}", step, workflow.name);
            }
        }
    }

    #[test]
    fn test_registry_builds_workflow() {
        let registry = registry(&["stage_dataset", "validate_dataset"]);
        let pipeline = registry.workflow("stage").unwrap();
        assert_eq!(pipeline.step_names(), vec!["stage_dataset", "validate_dataset"]);
    }

    #[test]
    fn test_registry_missing_body() {
        let err = registry(&["stage_dataset"]).workflow("stage").unwrap_err();
        assert_eq!(err.steps, vec!["validate_dataset".to_string()]);
    }

    #[test]
    fn test_registry_unknown_names() {
        let registry = registry(&["made_up"]);
        assert!(registry.spec("made_up").is_err());
        assert!(registry.workflow("made_up").is_err());
    }

    #[test]
    fn test_registry_applies_defaults() {
        let registry = registry(&["archive_dataset", "batch_download"]).with_defaults(StepDefaults {
            max_retries: 1,
            retry_delay_secs: 2,
        });
        let archive = registry.spec("archive_dataset").unwrap();
        assert_eq!(archive.policy.max_retries, 1);
        assert_eq!(archive.policy.backoff.delay(1), Duration::from_secs(2));

        let batch = registry.spec("batch_download").unwrap();
        assert_eq!(batch.policy.max_retries, 0);
    }
}
