//! Records exchanged with the metadata API.
//!
//! Byte counts travel as strings on the wire and dates use
//! [`API_DATE_FORMAT`](crate::utils::API_DATE_FORMAT). Both are converted at
//! the serde boundary: unparseable values become `None` instead of failing
//! the whole record.

use crate::utils::{format_api_timestamp, parse_api_timestamp, parse_number, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A dataset as returned by `GET /datasets/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Database ID; absent on records that were never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Dataset name.
    #[serde(default)]
    pub name: String,
    /// Dataset type, e.g. `RAW_DATA` or `DATA_PRODUCT`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,
    /// Apparent size in bytes.
    #[serde(default, with = "size_string", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Disk usage in bytes.
    #[serde(default, with = "size_string", skip_serializing_if = "Option::is_none")]
    pub du_size: Option<u64>,
    /// Creation time.
    #[serde(default, with = "api_date", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Last update time.
    #[serde(default, with = "api_date", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// Files, present when requested with `files=true`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<DatasetFile>,
    /// Fields this crate does not model, kept so updates round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    /// Creates an unsaved dataset record.
    #[must_use]
    pub fn new(name: impl Into<String>, dataset_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dataset_type: Some(dataset_type.into()),
            ..Self::default()
        }
    }
}

/// One file of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Path relative to the dataset root.
    pub path: String,
    /// MD5 hex digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// Size in bytes.
    #[serde(default, with = "size_string", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /datasets/{id}/states`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetState {
    /// State name, e.g. `ARCHIVED`.
    pub state: String,
    /// Free-form state metadata.
    pub metadata: Option<Value>,
}

/// A source/derived link between two datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAssociation {
    /// The dataset the other was derived from.
    pub source_id: u64,
    /// The derived dataset.
    pub derived_id: u64,
}

/// A measurement reported to `POST /metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name.
    pub name: String,
    /// Measured value.
    pub value: Value,
    /// Labels and any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metric {
    /// Creates a metric without labels.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            extra: Map::new(),
        }
    }
}

/// `Option<u64>` sent as a decimal string.
mod size_string {
    use super::{parse_number, Value};
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => parse_number(Some(&s)),
            Some(Value::Number(n)) => n.as_u64(),
            _ => None,
        })
    }
}

/// `Option<Timestamp>` in the API date format; malformed dates become `None`.
mod api_date {
    use super::{format_api_timestamp, parse_api_timestamp, Timestamp, Value};
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&format_api_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => parse_api_timestamp(&s).ok(),
            _ => None,
        })
    }
}
