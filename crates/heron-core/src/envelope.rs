//! JSON response envelope.
//!
//! Turns a status, an optional payload and an optional message into an
//! encoded response body:
//!
//! ```json
//! { "success": true, "data": { ... }, "message": "..." }
//! { "success": false, "error": { "code": "NOT_FOUND", "message": "..." } }
//! ```

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

use crate::{HandlerError, Response};

/// The envelope wrapped around every JSON body.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a T>,
    /// Optional human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    /// Error details for failed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody<'a>>,
}

/// Error details inside an [`Envelope`].
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    /// Machine-readable error code.
    pub code: &'a str,
    /// Human-readable error message.
    pub message: &'a str,
}

/// Builds a successful envelope response.
pub fn success<T: Serialize>(status: StatusCode, data: &T, message: Option<&str>) -> Response {
    let envelope = Envelope {
        success: status.is_success(),
        data: Some(data),
        message,
        error: None,
    };
    encode(status, &envelope)
}

/// Builds an error envelope response.
pub fn error(status: StatusCode, code: &str, message: &str) -> Response {
    let envelope: Envelope<'_, ()> = Envelope {
        success: false,
        data: None,
        message: None,
        error: Some(ErrorBody { code, message }),
    };
    encode(status, &envelope)
}

/// Builds the error response for a handler error.
///
/// Faults are never described to the client.
pub fn from_handler_error(err: &HandlerError) -> Response {
    if err.is_fault() {
        return internal_error();
    }
    error(err.status_code(), err.code(), &err.to_string())
}

/// The fixed response sent for any unexpected fault.
pub fn internal_error() -> Response {
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "internal server error",
    )
}

/// Serializes any value as a bare JSON response, without an envelope.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    encode(status, value)
}

fn encode<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, Bytes::from(body), "application/json"),
        Err(_) => with_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"{\"success\":false}"),
            "application/json",
        ),
    }
}

/// Builds a response with a body and content type.
pub fn with_body(status: StatusCode, body: Bytes, content_type: &'static str) -> Response {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Builds a plain-text response.
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response {
    with_body(status, body.into(), "text/plain; charset=utf-8")
}
