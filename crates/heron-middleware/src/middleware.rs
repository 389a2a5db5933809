//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all middleware stages implement,
//! and the [`Endpoint`] trait for whatever sits at the end of a chain.
//! Middleware processes requests before they reach the endpoint and responses
//! after it completes.
//!
//! # Example
//!
//! ```ignore
//! use heron_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Request, Response};
//!
//! struct TimingMiddleware;
//!
//! impl Middleware for TimingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let response = next.run(ctx, request).await;
//!             println!("{} took {:?}", ctx.request_id(), ctx.elapsed());
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::pipeline::BoxedMiddleware;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// Middleware receives a mutable context, the incoming request, and a
/// [`Next`] callback to invoke the rest of the chain.
///
/// # Invariants
///
/// - Middleware MUST call `next.run()` at most once
/// - Not calling it short-circuits the chain with the middleware's own response
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware stage.
    ///
    /// This name is used for logging and debugging.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The terminal of a middleware chain.
///
/// The server's dispatcher and route handlers implement this.
pub trait Endpoint: Send + Sync {
    /// Produces the response for a request.
    fn call<'a>(&'a self, ctx: &'a mut MiddlewareContext, request: Request)
        -> BoxFuture<'a, Response>;
}

/// Callback to invoke the next middleware in the chain.
///
/// This type is passed to middleware and consumed by [`Next::run`], so it
/// can be called at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More middleware to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain
    Endpoint(&'a dyn Endpoint),
}

impl<'a> Next<'a> {
    /// Creates a terminal `Next` that invokes the endpoint.
    pub fn endpoint(endpoint: &'a dyn Endpoint) -> Self {
        Self {
            inner: NextInner::Endpoint(endpoint),
        }
    }

    /// Wraps `next` with one more middleware.
    pub fn wrap(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Wraps `terminal` with a list of middleware.
    ///
    /// The first element of `middleware` becomes the outermost wrapper, so it
    /// runs first on the way in and last on the way out.
    pub fn chain(middleware: &'a [BoxedMiddleware], terminal: Next<'a>) -> Self {
        middleware
            .iter()
            .rev()
            .fold(terminal, |next, mw| Self::wrap(mw.as_ref(), next))
    }

    /// Invokes the next middleware or the endpoint.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Endpoint(endpoint) => endpoint.call(ctx, request).await,
        }
    }

    /// Boxes [`Next::run`], for stages that only pass the request through.
    pub fn run_boxed(self, ctx: &'a mut MiddlewareContext, request: Request) -> BoxFuture<'a, Response> {
        Box::pin(self.run(ctx, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_core::{body, envelope};
    use http::StatusCode;
    use std::sync::Arc;

    struct Ok200;

    impl Endpoint for Ok200 {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { envelope::text(StatusCode::OK, "OK") })
        }
    }

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let mut seen = ctx.get_extension::<Vec<&'static str>>().cloned().unwrap_or_default();
                seen.push(self.0);
                ctx.set_extension(seen);
                next.run(ctx, request).await
            })
        }
    }

    #[tokio::test]
    async fn test_endpoint_only() {
        let mut ctx = MiddlewareContext::new();
        let response = Next::endpoint(&Ok200)
            .run(&mut ctx, http::Request::new(body::empty()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chain_runs_in_slice_order() {
        let middleware: Vec<BoxedMiddleware> = vec![Arc::new(Tag("first")), Arc::new(Tag("second"))];
        let mut ctx = MiddlewareContext::new();

        let response = Next::chain(&middleware, Next::endpoint(&Ok200))
            .run(&mut ctx, http::Request::new(body::empty()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            ctx.get_extension::<Vec<&'static str>>().unwrap(),
            &vec!["first", "second"]
        );
    }
}
