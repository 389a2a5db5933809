//! Access logging.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// Writes one `tracing` event per request once the response is known.
///
/// The level follows the status class: 5xx at `error`, 4xx at `warn`,
/// everything else at `info`.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    _private: (),
}

impl LoggingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_owned();

            let response = next.run(ctx, request).await;

            let status = response.status().as_u16();
            let duration_ms = ctx.elapsed().as_secs_f64() * 1000.0;
            let request_id = ctx.request_id();
            let route = ctx.route().unwrap_or("-");

            if response.status().is_server_error() {
                tracing::error!(%request_id, %method, %path, route, status, duration_ms, "request completed");
            } else if response.status().is_client_error() {
                tracing::warn!(%request_id, %method, %path, route, status, duration_ms, "request completed");
            } else {
                tracing::info!(%request_id, %method, %path, route, status, duration_ms, "request completed");
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

    struct Status(StatusCode);

    impl Endpoint for Status {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            let status = self.0;
            Box::pin(async move { envelope::text(status, "") })
        }
    }

    #[tokio::test]
    async fn test_response_is_passed_through_unchanged() {
        for status in [StatusCode::OK, StatusCode::NOT_FOUND, StatusCode::BAD_GATEWAY] {
            let mut ctx = MiddlewareContext::new();
            let response = LoggingMiddleware::new()
                .process(
                    &mut ctx,
                    http::Request::new(body::empty()),
                    Next::endpoint(&Status(status)),
                )
                .await;
            assert_eq!(response.status(), status);
        }
    }
}
