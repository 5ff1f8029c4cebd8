//! Error types for Harvest.
//!
//! [`HarvestError`] is the single error type flowing through a dispatcher
//! run. Stages return it from [`process`], the dispatcher offers it to every
//! entered stage during unwind, and whatever is left reaches the caller.
//!
//! | Variant | Raised when |
//! |---|---|
//! | `Setup` | a dispatcher runs with no stages configured |
//! | `NotFound` | the chain ran out without any stage producing a response |
//! | `Resolution` | a deferred stage's type could not be constructed |
//! | `StackCorrupted` | the suspend/resume protocol was violated |
//! | `Http` | a stage fails with an explicit HTTP status |
//! | `Internal` | anything else a stage raises |
//!
//! [`process`]: https://docs.rs/harvest-middleware/latest/harvest_middleware/trait.Middleware.html#tymethod.process

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`HarvestError`].
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No middleware configured.
    Setup,
    /// No stage handled the request.
    NotFound,
    /// A deferred middleware could not be resolved.
    Resolution,
    /// Internal protocol violation inside the dispatcher.
    StackCorrupted,
    /// A stage failure carrying its own HTTP status.
    Http,
    /// Any other stage failure.
    Internal,
}

/// Standard error type for Harvest.
///
/// # Example
///
/// ```
/// use harvest_core::{ErrorCategory, HarvestError};
/// use http::StatusCode;
///
/// let error = HarvestError::not_found("GET", "/missing");
/// assert_eq!(error.category(), ErrorCategory::NotFound);
/// assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
/// ```
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The dispatcher has nothing to run.
    #[error("Setup error: {message}")]
    Setup {
        /// Human-readable error message.
        message: String,
    },

    /// Routing exhaustion: every stage delegated past the end of the chain.
    #[error("Not found: {message} ({method} {path})")]
    NotFound {
        /// Human-readable error message.
        message: String,
        /// Method of the request that reached the end of the chain.
        method: String,
        /// Path of the request that reached the end of the chain.
        path: String,
    },

    /// A deferred stage could not be resolved and was not optional.
    #[error("Resolution error: middleware {type_name} could not be resolved: {reason}")]
    Resolution {
        /// The type name that failed to resolve.
        type_name: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The suspend/resume protocol between dispatcher and stages was violated.
    #[error("Middleware stack has been corrupted: {message}")]
    StackCorrupted {
        /// Description of the violation.
        message: String,
    },

    /// A stage failed with an explicit HTTP status.
    #[error("{message}")]
    Http {
        /// Status the failure maps to.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
    },

    /// Any other stage failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl HarvestError {
    /// Creates a setup error.
    #[must_use]
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Creates the routing-exhaustion error for a request.
    #[must_use]
    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            message: "No middleware could handle the current request".to_string(),
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates a resolution error.
    #[must_use]
    pub fn resolution(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a stack corruption error.
    #[must_use]
    pub fn stack_corrupted(message: impl Into<String>) -> Self {
        Self::StackCorrupted {
            message: message.into(),
        }
    }

    /// Creates an error with an explicit HTTP status.
    #[must_use]
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Setup { .. } => ErrorCategory::Setup,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Resolution { .. } => ErrorCategory::Resolution,
            Self::StackCorrupted { .. } => ErrorCategory::StackCorrupted,
            Self::Http { .. } => ErrorCategory::Http,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Http { status, .. } => *status,
            Self::Setup { .. }
            | Self::Resolution { .. }
            | Self::StackCorrupted { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for the routing-exhaustion error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for dispatcher protocol violations.
    #[must_use]
    pub const fn is_stack_corrupted(&self) -> bool {
        matches!(self, Self::StackCorrupted { .. })
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
                status: self.status_code().as_u16(),
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "SETUP_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Resolution { .. } => "RESOLUTION_ERROR",
            Self::StackCorrupted { .. } => "STACK_CORRUPTED",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for HarvestError {
    fn from(source: anyhow::Error) -> Self {
        Self::Internal {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// HTTP status the error maps to.
    pub status: u16,
}
