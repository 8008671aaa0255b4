//! Run identity for correlating pipeline executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one run of a pipeline over one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Unique ID of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Dataset the run operates on.
    pub dataset_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates a new identity with a generated run ID.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self::with_run_id(Uuid::new_v4(), pipeline, dataset_id)
    }

    /// Creates an identity with a specific run ID.
    ///
    /// The worker substrate reuses the run ID when it delivers the steps of
    /// one run to different workers.
    #[must_use]
    pub fn with_run_id(
        run_id: Uuid,
        pipeline: impl Into<String>,
        dataset_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            pipeline: pipeline.into(),
            dataset_id: dataset_id.into(),
            started_at: Utc::now(),
        }
    }

    /// Inserts the correlation fields into an event payload object.
    pub fn annotate(&self, map: &mut serde_json::Map<String, serde_json::Value>) {
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("dataset_id".to_string(), serde_json::json!(self.dataset_id));
    }
}
