//! Error types returned by request handlers.
//!
//! Handlers return [`HandlerResult`]. Client errors are turned into a
//! response with a matching status code. [`HandlerError::Internal`] is a
//! fault: it is reported to the recovery boundary, which answers with a
//! single generic 500 response and logs the cause.

use http::StatusCode;
use thiserror::Error;

use crate::body::{is_length_limit_error, BoxError};

/// Result type alias for handlers.
pub type HandlerResult<T = crate::Response> = Result<T, HandlerError>;

/// Errors a handler can return.
///
/// # Example
///
/// ```
/// use heron_core::HandlerError;
/// use http::StatusCode;
///
/// let err = HandlerError::not_found("user 42");
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// assert!(!err.is_fault());
/// ```
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request body exceeded the configured limit.
    #[error("request body too large")]
    PayloadTooLarge,

    /// The request deadline passed before the handler finished.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// A dependency needed to serve the request is unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Creates a [`HandlerError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates a [`HandlerError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a [`HandlerError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a [`HandlerError::Internal`] from a message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(message.into()))
    }

    /// Maps an error raised while reading a request body.
    pub fn from_body_error(error: BoxError) -> Self {
        if is_length_limit_error(&error) {
            Self::PayloadTooLarge
        } else {
            Self::BadRequest(format!("failed to read request body: {error}"))
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is an unexpected fault rather than a
    /// client-facing outcome.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
