//! Timestamp utilities for the metadata API date format.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Date format used by the metadata API, e.g. `2024-03-01T09:15:02.123456Z`.
pub const API_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Format used when writing dates back to the API (six fractional digits).
const API_DATE_WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

/// Returns the current UTC time as an ISO 8601 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Parses a timestamp in the API date format.
///
/// # Errors
///
/// Returns `TimestampError` if the input is empty or not in [`API_DATE_FORMAT`].
pub fn parse_api_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }
    NaiveDateTime::parse_from_str(trimmed, API_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| TimestampError::InvalidFormat(format!("{trimmed}: {e}")))
}

/// Formats a timestamp in the API date format.
#[must_use]
pub fn format_api_timestamp(ts: &Timestamp) -> String {
    ts.format(API_DATE_WRITE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_micros(1500)), 1);
        assert_eq!(duration_ms(Duration::from_secs(630)), 630_000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_parse_api_timestamp() {
        let ts = parse_api_timestamp("2024-03-01T09:15:02.123456Z").unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.second(), 2);
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_api_timestamp_errors() {
        assert!(matches!(parse_api_timestamp("  "), Err(TimestampError::EmptyString)));
        assert!(matches!(
            parse_api_timestamp("01/03/2024"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(parse_api_timestamp("2024-03-01T09:15:02+00:00").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        let ts = parse_api_timestamp("2023-12-31T23:59:59.000500Z").unwrap();
        assert_eq!(format_api_timestamp(&ts), "2023-12-31T23:59:59.000500Z");
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
