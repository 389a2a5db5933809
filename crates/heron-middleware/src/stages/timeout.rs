//! Cooperative request timeout.
//!
//! The stage gives every request a deadline and a cancellation token that
//! fires when the deadline passes. Handlers observe the token through their
//! `RequestContext` and stop on their own; the stage never drops a running
//! handler.
//!
//! Clients may ask for a shorter deadline with `X-Request-Timeout` (in
//! milliseconds). Values outside the allowed range are ignored and a value
//! above the server timeout is capped to it.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use std::time::{Duration, Instant};

/// Header carrying a client requested timeout in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// Smallest client requested timeout that is honoured.
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Attaches a deadline and cancels the request token when it passes.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Creates the middleware with the server-wide request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the server-wide request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn effective_timeout(&self, request: &Request) -> Duration {
        let requested = request
            .headers()
            .get(REQUEST_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        match requested {
            Some(ms) if ms >= MIN_REQUEST_TIMEOUT_MS => {
                Duration::from_millis(ms).min(self.timeout)
            }
            Some(ms) => {
                tracing::debug!(
                    timeout_ms = ms,
                    min = MIN_REQUEST_TIMEOUT_MS,
                    "client timeout below minimum, ignoring"
                );
                self.timeout
            }
            None => self.timeout,
        }
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let timeout = self.effective_timeout(&request);
            let token = ctx.cancellation().child_token();
            ctx.set_cancellation(token.clone(), Instant::now() + timeout);

            let request_id = ctx.request_id();
            let method = request.method().clone();
            let path = request.uri().path().to_owned();

            let handler = next.run(ctx, request);
            tokio::pin!(handler);

            tokio::select! {
                response = &mut handler => return response,
                () = tokio::time::sleep(timeout) => {}
            }

            token.cancel();
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "request deadline exceeded, waiting for handler to stop"
            );
            handler.await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use heron_core::{body, envelope, HandlerError};
    use http::StatusCode;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Waits for cancellation, then answers 504.
    #[derive(Default)]
    struct Cooperative {
        observed: AtomicBool,
    }

    impl Endpoint for Cooperative {
        fn call<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let token = ctx.cancellation().clone();
                tokio::select! {
                    () = token.cancelled() => {
                        self.observed.store(true, Ordering::SeqCst);
                        envelope::from_handler_error(&HandlerError::DeadlineExceeded)
                    }
                    () = tokio::time::sleep(Duration::from_secs(60)) => {
                        envelope::text(StatusCode::OK, "late")
                    }
                }
            })
        }
    }

    struct Quick;

    impl Endpoint for Quick {
        fn call<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                assert!(ctx.deadline().is_some());
                envelope::text(StatusCode::OK, "done")
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_token_and_waits_for_handler() {
        let endpoint = Cooperative::default();
        let mut ctx = MiddlewareContext::new();

        let response = TimeoutMiddleware::new(Duration::from_millis(100))
            .process(
                &mut ctx,
                http::Request::new(body::empty()),
                Next::endpoint(&endpoint),
            )
            .await;

        assert!(endpoint.observed.load(Ordering::SeqCst));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(ctx.cancellation().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_handler_is_not_cancelled() {
        let mut ctx = MiddlewareContext::new();
        let response = TimeoutMiddleware::new(Duration::from_secs(1))
            .process(
                &mut ctx,
                http::Request::new(body::empty()),
                Next::endpoint(&Quick),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!ctx.cancellation().is_cancelled());
    }

    #[test]
    fn test_client_timeout_is_capped() {
        let mw = TimeoutMiddleware::new(Duration::from_secs(5));
        let with = |value: &str| {
            http::Request::builder()
                .header(REQUEST_TIMEOUT_HEADER, value)
                .body(body::empty())
                .unwrap()
        };

        assert_eq!(mw.effective_timeout(&with("250")), Duration::from_millis(250));
        assert_eq!(mw.effective_timeout(&with("60000")), Duration::from_secs(5));
        assert_eq!(mw.effective_timeout(&with("10")), Duration::from_secs(5));
        assert_eq!(mw.effective_timeout(&with("soon")), Duration::from_secs(5));
    }
}
