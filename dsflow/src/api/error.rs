//! Errors surfaced by the metadata API client.

use crate::errors::ConfigError;
use thiserror::Error;

/// A failed API call, after transport-level retries were exhausted or skipped.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status that is not retried,
    /// or kept answering with a retried status until the budget ran out.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Response body, possibly empty.
        body: String,
    },

    /// The request could not be completed.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Requests sent, including the first.
        attempts: u32,
        /// Last transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not the expected JSON.
    #[error("invalid response body from {url}: {source}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// A request path could not be joined to the base URL.
    #[error("invalid request path '{path}': {reason}")]
    InvalidUrl {
        /// The relative path.
        path: String,
        /// Why joining failed.
        reason: String,
    },

    /// A local file to upload could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled while a request was in flight or waiting to be retried.
    #[error("request to {url} cancelled")]
    Cancelled {
        /// Request URL.
        url: String,
    },

    /// The client configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// Returns the HTTP status for [`ApiError::Status`].
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true when the error came from cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
