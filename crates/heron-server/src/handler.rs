//! Handlers and route dispatch.
//!
//! A [`Handler`] turns a [`RequestContext`] and a request into a
//! [`HandlerResult`]. Plain async functions and closures are handlers:
//!
//! ```rust
//! use heron_core::{envelope, HandlerResult, Request, RequestContext};
//! use http::StatusCode;
//!
//! async fn get_user(ctx: RequestContext, _req: Request) -> HandlerResult {
//!     let id = ctx.param("id").unwrap_or_default();
//!     Ok(envelope::success(StatusCode::OK, &id, None))
//! }
//! # fn assert_handler<H: heron_server::Handler>(_: H) {}
//! # assert_handler(get_user);
//! ```
//!
//! The [`Dispatcher`] sits at the end of the global middleware chain. It
//! matches the request against the route table, runs the route's own
//! middleware and then the handler.

use std::future::Future;
use std::sync::Arc;

use heron_core::{envelope, HandlerResult, Request, RequestContext, Response};
use heron_middleware::{BoxFuture, BoxedMiddleware, Endpoint, MiddlewareContext, Next};
use heron_router::{Dispatch, Router};
use http::StatusCode;

use crate::error::ServerError;

/// Request handler.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx, request))
    }
}

/// A handler bound to a route, with the route's middleware.
#[derive(Clone)]
pub struct RouteEntry {
    handler: Arc<dyn Handler>,
    middleware: Vec<BoxedMiddleware>,
}

impl RouteEntry {
    /// Creates an entry.
    pub fn new(handler: impl Handler, middleware: Vec<BoxedMiddleware>) -> Self {
        Self {
            handler: Arc::new(handler),
            middleware,
        }
    }

    /// Returns the names of the route middleware, outermost first.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|mw| mw.name()).collect()
    }

    async fn run(&self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        let endpoint = HandlerEndpoint {
            handler: self.handler.as_ref(),
        };
        Next::chain(&self.middleware, Next::endpoint(&endpoint))
            .run(ctx, request)
            .await
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("middleware", &self.middleware_names())
            .finish_non_exhaustive()
    }
}

/// Calls a handler and maps its error to a response.
///
/// Faults are recorded on the context and answered with the generic 500;
/// the recovery stage logs them.
struct HandlerEndpoint<'h> {
    handler: &'h dyn Handler,
}

impl Endpoint for HandlerEndpoint<'_> {
    fn call<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.handler.call(ctx.to_request_context(), request).await {
                Ok(response) => response,
                Err(err) if err.is_fault() => {
                    ctx.record_fault(ServerError::HandlerFault(format!("{err:#}")).to_string());
                    envelope::internal_error()
                }
                Err(err) => envelope::from_handler_error(&err),
            }
        })
    }
}

/// Terminal endpoint of the global chain: routes the request.
#[derive(Debug)]
pub struct Dispatcher {
    router: Router<RouteEntry>,
}

impl Dispatcher {
    /// Creates a dispatcher over a finished route table.
    pub fn new(router: Router<RouteEntry>) -> Self {
        Self { router }
    }

    /// Returns the route table.
    pub fn router(&self) -> &Router<RouteEntry> {
        &self.router
    }
}

impl Endpoint for Dispatcher {
    fn call<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.router.dispatch(request.method(), request.uri().path()) {
                Dispatch::Matched(matched) => {
                    let entry = matched.value();
                    ctx.set_route(matched.route().pattern().as_str());
                    ctx.set_params(matched.into_params());
                    entry.run(ctx, request).await
                }
                Dispatch::Fallback(entry) => entry.run(ctx, request).await,
                Dispatch::NotFound => {
                    let err = ServerError::RouteNotFound {
                        method: request.method().to_string(),
                        path: request.uri().path().to_owned(),
                    };
                    tracing::debug!(request_id = %ctx.request_id(), "{err}");
                    envelope::error(StatusCode::NOT_FOUND, "NOT_FOUND", &err.to_string())
                }
            }
        })
    }
}
