//! Common types used throughout the middleware pipeline.
//!
//! This module re-exports the request and response types from `heron-core`
//! and adds helpers for building error responses.

pub use heron_core::{Body, Request, Response};

use heron_core::envelope;

/// Extension trait for building error responses.
pub trait ResponseExt {
    /// Creates a plain-text error response.
    fn error(status: http::StatusCode, message: &str) -> Response;

    /// Creates a JSON error response in the standard envelope.
    fn json_error(status: http::StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn error(status: http::StatusCode, message: &str) -> Response {
        envelope::text(status, message.to_string())
    }

    fn json_error(status: http::StatusCode, code: &str, message: &str) -> Response {
        envelope::error(status, code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_error_response() {
        let response = Response::error(StatusCode::BAD_REQUEST, "Invalid input");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_json_error_response() {
        let response = Response::json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many requests",
        );
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
