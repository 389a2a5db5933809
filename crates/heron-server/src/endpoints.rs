//! Built-in health and metrics endpoints.
//!
//! | Path | Response |
//! |------|----------|
//! | `GET /api/v1/health` | health snapshot, 200 or 503 |
//! | `GET /api/v1/health/ready` | `{"status":"ready"}` 200 or `{"status":"not ready"}` 503 |
//! | `GET /api/v1/health/live` | `{"status":"alive"}` 200 |
//! | `GET /api/v1/metrics` | metrics snapshot |
//!
//! They are registered ahead of user routes, so they cannot be shadowed.

use std::sync::Arc;

use heron_config::HealthEndpointMode;
use heron_core::{envelope, HandlerResult, Request, RequestContext};
use heron_router::{RouteError, Router};
use heron_telemetry::MetricsRegistry;
use http::StatusCode;
use serde_json::json;

use crate::handler::RouteEntry;
use crate::health::HealthRegistry;

/// Aggregate health.
pub const HEALTH_PATH: &str = "/api/v1/health";
/// Readiness.
pub const READY_PATH: &str = "/api/v1/health/ready";
/// Liveness.
pub const LIVE_PATH: &str = "/api/v1/health/live";
/// Metrics snapshot.
pub const METRICS_PATH: &str = "/api/v1/metrics";

pub(crate) fn register_health(
    router: &mut Router<RouteEntry>,
    registry: &Arc<HealthRegistry>,
    mode: HealthEndpointMode,
) -> Result<(), RouteError> {
    let health = Arc::clone(registry);
    router.add_route(
        "GET",
        HEALTH_PATH,
        RouteEntry::new(
            move |_ctx: RequestContext, _req: Request| {
                let registry = Arc::clone(&health);
                async move { health_handler(&registry, mode).await }
            },
            Vec::new(),
        ),
    )?;

    let ready = Arc::clone(registry);
    router.add_route(
        "GET",
        READY_PATH,
        RouteEntry::new(
            move |_ctx: RequestContext, _req: Request| {
                let registry = Arc::clone(&ready);
                async move { ready_handler(&registry).await }
            },
            Vec::new(),
        ),
    )?;

    router.add_route("GET", LIVE_PATH, RouteEntry::new(live_handler, Vec::new()))
}

pub(crate) fn register_metrics(
    router: &mut Router<RouteEntry>,
    registry: &Arc<MetricsRegistry>,
) -> Result<(), RouteError> {
    let metrics = Arc::clone(registry);
    router.add_route(
        "GET",
        METRICS_PATH,
        RouteEntry::new(
            move |_ctx: RequestContext, _req: Request| {
                let snapshot = metrics.snapshot();
                async move { Ok(envelope::json(StatusCode::OK, &snapshot)) }
            },
            Vec::new(),
        ),
    )
}

async fn health_handler(registry: &HealthRegistry, mode: HealthEndpointMode) -> HandlerResult {
    let status = match mode {
        HealthEndpointMode::Fresh => registry.run_checks().await,
        HealthEndpointMode::Cached => registry.cached_status().await,
    };
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(envelope::json(code, &status))
}

async fn ready_handler(registry: &HealthRegistry) -> HandlerResult {
    let readiness = registry.readiness().await;
    Ok(if readiness.ready {
        envelope::json(StatusCode::OK, &json!({ "status": "ready" }))
    } else {
        envelope::json(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({ "status": "not ready" }),
        )
    })
}

async fn live_handler(_ctx: RequestContext, _req: Request) -> HandlerResult {
    Ok(envelope::json(StatusCode::OK, &json!({ "status": "alive" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Dispatcher;
    use heron_core::{body, Response};
    use heron_middleware::{Endpoint, MiddlewareContext};
    use http_body_util::BodyExt;
    use std::time::Duration;

    fn dispatcher(health: &Arc<HealthRegistry>, mode: HealthEndpointMode) -> Dispatcher {
        let mut router = Router::new();
        register_health(&mut router, health, mode).unwrap();
        register_metrics(&mut router, &Arc::new(MetricsRegistry::new(100))).unwrap();
        Dispatcher::new(router)
    }

    async fn get(dispatcher: &Dispatcher, path: &str) -> (StatusCode, serde_json::Value) {
        let request = http::Request::get(path).body(body::empty()).unwrap();
        let mut ctx = MiddlewareContext::new();
        let response: Response = dispatcher.call(&mut ctx, request).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reflects_checks() {
        let health = Arc::new(HealthRegistry::new("1.0.0"));
        health.register("database", || async { Ok(()) }).unwrap();
        let dispatcher = dispatcher(&health, HealthEndpointMode::Fresh);

        let (status, body) = get(&dispatcher, HEALTH_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        health.register("cache", || async { Err("timeout".to_string()) }).unwrap();
        let (status, body) = get(&dispatcher, HEALTH_PATH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["checks"]["cache"]["error"], "timeout");
    }

    #[tokio::test]
    async fn test_cached_mode_serves_last_run() {
        let health = Arc::new(HealthRegistry::new("1.0.0"));
        health.register("database", || async { Ok(()) }).unwrap();
        health.run_checks().await;
        health.register("database", || async { Err("down".to_string()) }).unwrap();
        let dispatcher = dispatcher(&health, HealthEndpointMode::Cached);

        let (status, _) = get(&dispatcher, HEALTH_PATH).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_and_live() {
        let health = Arc::new(HealthRegistry::new("1.0.0"));
        health.register("storage", || async { Err("read-only".to_string()) }).unwrap();
        let dispatcher = dispatcher(&health, HealthEndpointMode::Fresh);

        let (status, body) = get(&dispatcher, READY_PATH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "status": "not ready" }));

        let (status, body) = get(&dispatcher, LIVE_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "alive" }));

        health.register("storage", || async { Ok(()) }).unwrap();
        let (status, body) = get(&dispatcher, READY_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ready" }));
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let health = Arc::new(HealthRegistry::new("1.0.0"));
        let metrics = Arc::new(MetricsRegistry::new(100));
        metrics.record_request("GET", "/ping", 200, Duration::from_millis(4));

        let mut router = Router::new();
        register_health(&mut router, &health, HealthEndpointMode::Fresh).unwrap();
        register_metrics(&mut router, &metrics).unwrap();
        let dispatcher = Dispatcher::new(router);

        let (status, body) = get(&dispatcher, METRICS_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_requests"], 1);
        assert_eq!(body["endpoints"][0]["path"], "/ping");
    }
}
