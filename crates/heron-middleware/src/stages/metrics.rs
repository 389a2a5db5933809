//! Request metrics and `X-Response-Time`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use heron_telemetry::MetricsRegistry;
use http::{HeaderValue, Method};
use std::sync::Arc;
use std::time::Duration;

/// Response header carrying the handling time.
pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Path key shared by requests that matched no route, fallback included.
pub const UNMATCHED_ROUTE: &str = "*";

/// Method key shared by extension methods.
pub const OTHER_METHOD: &str = "OTHER";

/// Records every request into a [`MetricsRegistry`].
///
/// Requests are keyed by the matched route pattern, so `/users/1` and
/// `/users/2` share the `/users/{id}` entry. Requests that match no route,
/// including those answered by the fallback or a stage ahead of routing, all
/// share the [`UNMATCHED_ROUTE`] entry, and extension methods share
/// [`OTHER_METHOD`], so clients cannot grow the registry. The handling time is also returned in `X-Response-Time`, formatted
/// in milliseconds (`1.234ms`).
#[derive(Debug, Clone)]
pub struct MetricsMiddleware {
    registry: Arc<MetricsRegistry>,
}

impl MetricsMiddleware {
    /// Creates the middleware around a shared registry.
    #[must_use]
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

fn method_key(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        "PATCH" => "PATCH",
        "CONNECT" => "CONNECT",
        "TRACE" => "TRACE",
        _ => OTHER_METHOD,
    }
}

/// Formats a duration as milliseconds with three decimals.
#[must_use]
pub fn format_response_time(duration: Duration) -> String {
    format!("{:.3}ms", duration.as_secs_f64() * 1000.0)
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = method_key(request.method());

            let active = self.registry.track_active();
            let mut response = next.run(ctx, request).await;
            drop(active);

            let elapsed = ctx.elapsed();
            let path = ctx.route().unwrap_or(UNMATCHED_ROUTE);
            self.registry
                .record_request(method, path, response.status().as_u16(), elapsed);

            if let Ok(value) = HeaderValue::from_str(&format_response_time(elapsed)) {
                response.headers_mut().insert(RESPONSE_TIME_HEADER, value);
            }
            response
        })
    }
}
