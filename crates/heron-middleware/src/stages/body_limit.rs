//! Request body size limit.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use http::{header, StatusCode};
use http_body_util::{BodyExt, Limited};

/// Rejects request bodies larger than a fixed number of bytes.
///
/// A declared `Content-Length` above the limit is answered with 413 before
/// the handler runs. Every other body is wrapped so that reading past the
/// limit fails with `HandlerError::PayloadTooLarge`.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimitMiddleware {
    max_bytes: usize,
}

impl BodyLimitMiddleware {
    /// Creates the middleware with a limit in bytes.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Returns the limit in bytes.
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn declared_length(request: &Request) -> Option<u64> {
        request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

impl Middleware for BodyLimitMiddleware {
    fn name(&self) -> &'static str {
        "body_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let limit = u64::try_from(self.max_bytes).unwrap_or(u64::MAX);
            if let Some(length) = Self::declared_length(&request).filter(|len| *len > limit) {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    content_length = length,
                    limit,
                    "request body too large"
                );
                return Response::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    "request body too large",
                );
            }

            let max_bytes = self.max_bytes;
            let request = request.map(|body| Limited::new(body, max_bytes).boxed());
            next.run(ctx, request).await
        })
    }
}
