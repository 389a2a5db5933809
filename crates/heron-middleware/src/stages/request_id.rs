//! Request ID middleware.
//!
//! Every request gets a UUID v7 identifier. It is stored in the
//! [`MiddlewareContext`], copied into the request's `X-Request-ID` header for
//! downstream stages and echoed on the response so clients can correlate
//! their calls with server logs.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use heron_core::RequestId;
use http::HeaderValue;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns a request ID and echoes it in the response.
///
/// By default a fresh ID is always generated. With
/// [`RequestIdMiddleware::trust_incoming`], a well-formed UUID in the
/// incoming `X-Request-ID` header is reused; anything else is replaced.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a middleware that always generates new IDs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a middleware that reuses well-formed incoming IDs.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    fn incoming(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = self.incoming(&request).unwrap_or_default();
            ctx.set_request_id(request_id);

            // A UUID is always a valid header value.
            let value = HeaderValue::from_str(&request_id.to_string()).ok();
            if let Some(value) = &value {
                request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            }

            let mut response = next.run(ctx, request).await;
            if let Some(value) = value {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use heron_core::{body, envelope};
    use http::StatusCode;

    /// Echoes the request header it received in the body.
    struct Echo;

    impl Endpoint for Echo {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            request: Request,
        ) -> BoxFuture<'a, Response> {
            let seen = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Box::pin(async move { envelope::text(StatusCode::OK, seen) })
        }
    }

    fn request(header: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/");
        if let Some(header) = header {
            builder = builder.header(REQUEST_ID_HEADER, header);
        }
        builder.body(body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_generates_id_and_sets_header() {
        let mut ctx = MiddlewareContext::new();
        let response = RequestIdMiddleware::new()
            .process(&mut ctx, request(None), Next::endpoint(&Echo))
            .await;

        let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
        let id = RequestId::parse(header.to_str().unwrap()).unwrap();
        assert_eq!(id, ctx.request_id());
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_incoming_id_ignored_by_default() {
        let incoming = "0191d6a8-8c3e-7b1e-a3f4-2f4a0c9b1d2e";
        let mut ctx = MiddlewareContext::new();
        let response = RequestIdMiddleware::new()
            .process(&mut ctx, request(Some(incoming)), Next::endpoint(&Echo))
            .await;

        assert_ne!(response.headers().get(REQUEST_ID_HEADER).unwrap(), incoming);
    }

    #[tokio::test]
    async fn test_trusted_incoming_id_is_reused() {
        let incoming = "0191d6a8-8c3e-7b1e-a3f4-2f4a0c9b1d2e";
        let mut ctx = MiddlewareContext::new();
        let response = RequestIdMiddleware::trust_incoming()
            .process(&mut ctx, request(Some(incoming)), Next::endpoint(&Echo))
            .await;

        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), incoming);
        assert_eq!(ctx.request_id().to_string(), incoming);
    }

    #[tokio::test]
    async fn test_malformed_incoming_id_is_replaced() {
        let mut ctx = MiddlewareContext::new();
        let response = RequestIdMiddleware::trust_incoming()
            .process(&mut ctx, request(Some("not-a-uuid")), Next::endpoint(&Echo))
            .await;

        let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert!(RequestId::parse(header.to_str().unwrap()).is_some());
    }
}
