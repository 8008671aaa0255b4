//! Point-in-time progress measurement.

use serde::{Deserialize, Serialize};

/// Unit reported by every sample.
pub const BYTES: &str = "bytes";

/// A progress measurement of a long-running step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// What is being measured, e.g. `archive`.
    pub name: String,
    /// Bytes done so far.
    pub done: u64,
    /// Expected total bytes, when known.
    pub total: Option<u64>,
    /// `done / total` as a fraction. Absent when `total` is absent or zero.
    pub percent_done: Option<f64>,
    /// Unit of `done` and `total`.
    pub units: String,
}

impl ProgressSample {
    /// Builds a sample in bytes.
    #[must_use]
    pub fn new(name: impl Into<String>, done: u64, total: Option<u64>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let percent_done = total
            .filter(|t| *t > 0)
            .map(|t| done as f64 / t as f64);
        Self {
            name: name.into(),
            done,
            total,
            percent_done,
            units: BYTES.to_string(),
        }
    }

    /// Renders the sample as an event payload.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "done": self.done,
            "total": self.total,
            "percent_done": self.percent_done,
            "units": self.units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percent_with_total() {
        let sample = ProgressSample::new("archive", 512, Some(1024));
        assert_eq!(sample.percent_done, Some(0.5));
        assert_eq!(sample.units, "bytes");
    }

    #[test]
    fn test_percent_absent_without_total() {
        assert_eq!(ProgressSample::new("stage", 10, None).percent_done, None);
        assert_eq!(ProgressSample::new("stage", 10, Some(0)).percent_done, None);
    }

    #[test]
    fn test_event_data() {
        let data = ProgressSample::new("download", 3, None).to_event_data();
        assert_eq!(
            data,
            serde_json::json!({
                "name": "download",
                "done": 3,
                "total": null,
                "percent_done": null,
                "units": "bytes",
            })
        );
    }
}
