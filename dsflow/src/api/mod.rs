//! Metadata API access.
//!
//! [`ApiClient`] hides transient network failures from its callers: step
//! bodies see either a decoded response or a final [`ApiError`].

mod client;
mod error;
mod models;

pub use client::ApiClient;
pub use error::ApiError;
pub use models::{Dataset, DatasetAssociation, DatasetFile, DatasetState, Metric};
