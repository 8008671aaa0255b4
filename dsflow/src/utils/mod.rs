//! Utility functions for timestamps, sizes and JSON values.

pub mod timestamps;
mod values;

pub use timestamps::{
    duration_ms, format_api_timestamp, iso_timestamp, parse_api_timestamp, Timestamp, TimestampError,
    API_DATE_FORMAT,
};
pub use values::{convert_size_to_bytes, merge, parse_number};
