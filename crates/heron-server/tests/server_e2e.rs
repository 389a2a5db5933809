//! End-to-end tests against a listening server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client, local, pong, start};
use heron_core::{envelope, HandlerError, HandlerResult, Request, RequestContext};
use heron_middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareContext, Next, Response};
use heron_server::{LifecycleError, LifecycleState, ServerConfig, ServerError, HEALTH_PATH};
use http::StatusCode;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::Value;

type Trace = Arc<Mutex<Vec<&'static str>>>;

struct Record {
    name: &'static str,
    trace: Trace,
}

impl Middleware for Record {
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        self.trace.lock().push(self.name);
        next.run_boxed(ctx, request)
    }
}

#[tokio::test]
async fn test_ping_round_trip() {
    let server = local().build().unwrap();
    server.get("/ping", pong).unwrap();
    let running = start(server).await;
    assert_eq!(running.server.state(), LifecycleState::Listening);

    let response = client().get(running.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(!request_id.is_empty());
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().get("strict-transport-security").is_none());
    assert_eq!(response.text().await.unwrap(), "pong");

    running.stop().await;
}

#[tokio::test]
async fn test_incoming_request_id_is_replaced_by_default() {
    let server = local().build().unwrap();
    server.get("/ping", pong).unwrap();
    let running = start(server).await;

    let id = "0192f1a4-6f7e-7c3b-9a51-6d2c8e4b1f00";
    let response = client()
        .get(running.url("/ping"))
        .header("x-request-id", id)
        .send()
        .await
        .unwrap();
    let echoed = response.headers()["x-request-id"].to_str().unwrap();
    assert!(!echoed.is_empty());
    assert_ne!(echoed, id);

    running.stop().await;
}

#[tokio::test]
async fn test_trusted_request_id_is_kept() {
    let server = local().trust_request_id(true).build().unwrap();
    server.get("/ping", pong).unwrap();
    let running = start(server).await;
    let client = client();

    let id = "0192f1a4-6f7e-7c3b-9a51-6d2c8e4b1f00";
    let response = client
        .get(running.url("/ping"))
        .header("x-request-id", id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], id);

    let malformed = client
        .get(running.url("/ping"))
        .header("x-request-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_ne!(malformed.headers()["x-request-id"], "not-a-uuid");

    running.stop().await;
}

#[tokio::test]
async fn test_no_connections_after_shutdown() {
    let server = local().build().unwrap();
    server.get("/ping", pong).unwrap();
    let running = start(server).await;
    let addr = running.addr;

    let report = running
        .server
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!report.already_stopped);
    running.task.await.unwrap().unwrap();
    assert_eq!(running.server.state(), LifecycleState::Stopped);
    assert!(running.server.local_addr().is_none());

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_middleware_order() {
    let trace: Trace = Arc::default();
    let server = local().build().unwrap();
    for name in ["A", "B"] {
        server
            .use_middleware(Record {
                name,
                trace: Arc::clone(&trace),
            })
            .unwrap();
    }
    let handler_trace = Arc::clone(&trace);
    let route_c: BoxedMiddleware = Arc::new(Record {
        name: "C",
        trace: Arc::clone(&trace),
    });
    server
        .route_with_middleware(
            "GET",
            "/traced",
            move |_ctx: RequestContext, _req: Request| {
                handler_trace.lock().push("handler");
                async { Ok(envelope::text(StatusCode::OK, "done")) }
            },
            vec![route_c],
        )
        .unwrap();
    let running = start(server).await;

    let response = client().get(running.url("/traced")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(*trace.lock(), vec!["A", "B", "C", "handler"]);

    trace.lock().clear();
    let response = client().get(running.url("/other")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(*trace.lock(), vec!["A", "B"]);

    running.stop().await;
}

#[tokio::test]
async fn test_first_registered_route_wins() {
    let server = local().build().unwrap();
    server
        .get("/users/me", |_ctx: RequestContext, _req: Request| async {
            Ok(envelope::text(StatusCode::OK, "me"))
        })
        .unwrap();
    server
        .get("/users/{id}", |ctx: RequestContext, _req: Request| async move {
            let id = ctx.param("id").unwrap_or_default().to_string();
            Ok(envelope::text(StatusCode::OK, id))
        })
        .unwrap();
    let running = start(server).await;
    let client = client();

    let me = client.get(running.url("/users/me")).send().await.unwrap();
    assert_eq!(me.text().await.unwrap(), "me");
    let other = client.get(running.url("/users/42")).send().await.unwrap();
    assert_eq!(other.text().await.unwrap(), "42");

    running.stop().await;
}

#[tokio::test]
async fn test_not_found_and_fallback() {
    let server = local().build().unwrap();
    server.get("/ping", pong).unwrap();
    let running = start(server).await;

    let response = client().get(running.url("/missing")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    running.stop().await;

    let server = local().build().unwrap();
    server
        .fallback(|_ctx: RequestContext, _req: Request| async {
            Ok(envelope::text(StatusCode::IM_A_TEAPOT, "fallback"))
        })
        .unwrap();
    let running = start(server).await;
    let response = client().get(running.url("/anything")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    running.stop().await;
}

#[tokio::test]
async fn test_handler_errors() {
    let server = local().build().unwrap();
    server
        .get("/bad", |_ctx: RequestContext, _req: Request| async {
            Err::<Response, _>(HandlerError::bad_request("missing name"))
        })
        .unwrap();
    server
        .get("/fault", |_ctx: RequestContext, _req: Request| async {
            Err::<Response, _>(HandlerError::internal("connection pool poisoned"))
        })
        .unwrap();
    server
        .get("/panic", |_ctx: RequestContext, _req: Request| async {
            if true {
                panic!("handler bug");
            }
            Ok(envelope::text(StatusCode::OK, "unreachable"))
        })
        .unwrap();
    let running = start(server).await;
    let client = client();

    let bad = client.get(running.url("/bad")).send().await.unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    for path in ["/fault", "/panic"] {
        let response = client.get(running.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        let text = response.text().await.unwrap();
        assert!(!text.contains("poisoned"));
        assert!(!text.contains("handler bug"));
    }

    // The server keeps serving after a panic.
    let again = client.get(running.url("/bad")).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    running.stop().await;
}

async fn echo(_ctx: RequestContext, req: Request) -> HandlerResult {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(HandlerError::from_body_error)?
        .to_bytes();
    Ok(envelope::text(StatusCode::OK, bytes))
}

#[tokio::test]
async fn test_request_body_limit() {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_body_bytes: 1024,
        ..ServerConfig::default()
    };
    let server = local().config(config).build().unwrap();
    server.post("/echo", echo).unwrap();
    let running = start(server).await;
    let client = client();

    let small = client
        .post(running.url("/echo"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(small.status(), StatusCode::OK);
    assert_eq!(small.text().await.unwrap(), "hello");

    let large = client
        .post(running.url("/echo"))
        .body("x".repeat(4096))
        .send()
        .await
        .unwrap();
    assert_eq!(large.status(), StatusCode::PAYLOAD_TOO_LARGE);

    running.stop().await;
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = local().build().unwrap();
    server.post("/echo", echo).unwrap();
    let running = start(server).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, running.url("/echo"))
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));

    let bare = client()
        .request(reqwest::Method::OPTIONS, running.url("/echo"))
        .send()
        .await
        .unwrap();
    assert_eq!(bare.status(), StatusCode::NOT_FOUND);

    running.stop().await;
}

#[tokio::test]
async fn test_large_responses_are_compressed() {
    let server = local().build().unwrap();
    server
        .get("/big", |_ctx: RequestContext, _req: Request| async {
            Ok(envelope::text(StatusCode::OK, "heron ".repeat(1000)))
        })
        .unwrap();
    let running = start(server).await;

    let response = client()
        .get(running.url("/big"))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["content-encoding"], "gzip");

    running.stop().await;
}

#[tokio::test]
async fn test_registration_after_start_fails() {
    let server = local().build().unwrap();
    let running = start(server).await;

    let err = running.server.get("/late", pong).unwrap_err();
    assert!(matches!(err, ServerError::Lifecycle(_)));

    let err = running
        .server
        .health()
        .register("late", || async { Err("never runs".to_string()) })
        .unwrap_err();
    assert_eq!(err, LifecycleError::Frozen { registry: "health" });
    let health = client()
        .get(running.url(HEALTH_PATH))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    running.stop().await;
}

#[tokio::test]
async fn test_static_files_mount() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "hello from disk").unwrap();
    std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

    let server = local().static_files(dir.path(), "/static").build().unwrap();
    server.get("/ping", pong).unwrap();
    let running = start(server).await;
    let client = client();

    let response = client
        .get(running.url("/static/hello.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(response.headers().contains_key("last-modified"));
    assert_eq!(response.text().await.unwrap(), "hello from disk");

    let hidden = client.get(running.url("/static/.env")).send().await.unwrap();
    assert_eq!(hidden.status(), StatusCode::FORBIDDEN);

    let missing = client
        .get(running.url("/static/nope.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let ping = client.get(running.url("/ping")).send().await.unwrap();
    assert_eq!(ping.status(), StatusCode::OK);

    running.stop().await;
}
