//! Test error types.

use harvest_core::HarvestError;
use thiserror::Error;

/// Errors that can occur while driving a dispatcher in tests.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// A header name or value was rejected.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The response body could not be read as requested.
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dispatcher returned an error instead of a response.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] HarvestError),
}
