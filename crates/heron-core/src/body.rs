//! HTTP body and message aliases shared by every Heron crate.
//!
//! Requests carry a boxed streaming body so that size limits can be applied
//! while the body is read. Responses are fully buffered.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError};

use crate::HandlerError;

/// Boxed error type carried by request bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The request body type.
pub type Body = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// The HTTP request type used throughout Heron.
pub type Request = http::Request<Body>;

/// The HTTP response type used throughout Heron.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Creates a request body from a complete buffer.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Creates an empty request body.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Reads the whole request body.
///
/// A body cut short by a size limit is reported as
/// [`HandlerError::PayloadTooLarge`].
pub async fn read_to_bytes(request: Request) -> Result<Bytes, HandlerError> {
    request
        .into_body()
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(HandlerError::from_body_error)
}

/// Returns true if the error was produced by a body size limit.
pub fn is_length_limit_error(error: &BoxError) -> bool {
    error.downcast_ref::<LengthLimitError>().is_some()
}
