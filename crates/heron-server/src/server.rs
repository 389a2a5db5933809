//! The HTTP server.
//!
//! A [`Server`] is built once, configured with routes, middleware and health
//! checks, then started. After [`Server::start`] the route table and the
//! middleware chain are frozen.
//!
//! # Example
//!
//! ```rust,no_run
//! use heron_core::{envelope, HandlerResult, Request, RequestContext};
//! use heron_server::Server;
//! use http::StatusCode;
//!
//! async fn ping(_ctx: RequestContext, _req: Request) -> HandlerResult {
//!     Ok(envelope::text(StatusCode::OK, "pong"))
//! }
//!
//! # async fn example() -> Result<(), heron_server::ServerError> {
//! let server = Server::builder().port(8080).build()?;
//! server.get("/ping", ping)?;
//! server.register_check("database", || async { Ok(()) })?;
//!
//! // Serves until SIGINT/SIGTERM, then shuts down gracefully.
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use heron_core::{BoxError, Request, Response, SharedClock, SystemClock};
use heron_middleware::stages::{
    BodyLimitMiddleware, CompressionMiddleware, CorsMiddleware, LoggingMiddleware,
    MetricsMiddleware, RateLimitMiddleware, RecoveryMiddleware, RequestIdMiddleware,
    SecurityHeadersMiddleware, TimeoutMiddleware,
};
use heron_middleware::{BoxedMiddleware, Middleware, MiddlewareContext, Pipeline};
use heron_router::{RouteError, Router};
use heron_telemetry::{MetricsRegistry, ProcessSampler, RuntimeSampler};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::background::{spawn_health_loop, spawn_metrics_loop};
use crate::config::{Features, RateLimit, ServerConfig, StaticMount, TlsPaths};
use crate::endpoints;
use crate::error::{ServerError, ServerResult};
use crate::handler::{Dispatcher, Handler, RouteEntry};
use crate::health::{HealthProbe, HealthRegistry};
use crate::lifecycle::{LifecycleError, LifecycleState, StateCell};
use crate::shutdown::{wait_for_os_signal, ShutdownCoordinator, ShutdownReport};
use crate::static_files::StaticFiles;
use crate::tls::load_tls_acceptor;

/// Pause after a failed `accept`, so a full file table does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Routes and global middleware collected before start.
struct Setup {
    router: Router<RouteEntry>,
    middleware: Vec<BoxedMiddleware>,
}

struct Inner {
    config: ServerConfig,
    state: StateCell,
    setup: Mutex<Option<Setup>>,
    health: Arc<HealthRegistry>,
    metrics: Arc<MetricsRegistry>,
    sampler: Arc<dyn ProcessSampler>,
    clock: SharedClock,
    coordinator: ShutdownCoordinator,
    local_addr: watch::Sender<Option<SocketAddr>>,
}

/// HTTP server handle.
///
/// Cloning is cheap; every clone controls the same server, so one task can
/// `start` it while another calls `shutdown`.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.inner.config.bind_addr())
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// The frozen request path: global chain, then dispatch.
struct App {
    pipeline: Pipeline,
    dispatcher: Dispatcher,
}

impl App {
    async fn handle(&self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        self.pipeline.process(ctx, request, &self.dispatcher).await
    }
}

fn route_error(err: RouteError) -> ServerError {
    ServerError::configuration(err.to_string())
}

impl Server {
    /// Returns a builder with default configuration.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates a server from a configuration.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        ServerBuilder::new().config(config).build()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Returns the health registry.
    ///
    /// Probes can be registered through it only until the server starts.
    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.inner.health
    }

    /// Returns the metrics registry.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    /// Returns the bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.borrow()
    }

    fn with_setup<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Setup) -> ServerResult<T>,
    ) -> ServerResult<T> {
        let mut guard = self.inner.setup.lock();
        self.inner.state.ensure_registration(operation)?;
        match guard.as_mut() {
            Some(setup) => f(setup),
            None => Err(LifecycleError::InvalidState {
                operation,
                state: self.state(),
            }
            .into()),
        }
    }

    /// Adds a route. `method` may be `*` to match any method.
    ///
    /// Routes match in registration order; the first match wins.
    pub fn route(&self, method: &str, pattern: &str, handler: impl Handler) -> ServerResult<()> {
        self.route_with_middleware(method, pattern, handler, Vec::new())
    }

    /// Adds a route with its own middleware, which runs inside every global
    /// middleware, in the order given.
    pub fn route_with_middleware(
        &self,
        method: &str,
        pattern: &str,
        handler: impl Handler,
        middleware: Vec<BoxedMiddleware>,
    ) -> ServerResult<()> {
        self.with_setup("add route", |setup| {
            setup
                .router
                .add_route(method, pattern, RouteEntry::new(handler, middleware))
                .map_err(route_error)
        })
    }

    /// Adds a `GET` route.
    pub fn get(&self, pattern: &str, handler: impl Handler) -> ServerResult<()> {
        self.route("GET", pattern, handler)
    }

    /// Adds a `POST` route.
    pub fn post(&self, pattern: &str, handler: impl Handler) -> ServerResult<()> {
        self.route("POST", pattern, handler)
    }

    /// Adds a `PUT` route.
    pub fn put(&self, pattern: &str, handler: impl Handler) -> ServerResult<()> {
        self.route("PUT", pattern, handler)
    }

    /// Adds a `DELETE` route.
    pub fn delete(&self, pattern: &str, handler: impl Handler) -> ServerResult<()> {
        self.route("DELETE", pattern, handler)
    }

    /// Sets the handler for requests no route matches.
    pub fn fallback(&self, handler: impl Handler) -> ServerResult<()> {
        self.route("*", "*", handler)
    }

    /// Appends global middleware. It runs inside the built-in stages, in
    /// registration order.
    pub fn use_middleware(&self, middleware: impl Middleware) -> ServerResult<()> {
        self.use_boxed_middleware(Arc::new(middleware))
    }

    /// Appends shared global middleware.
    pub fn use_boxed_middleware(&self, middleware: BoxedMiddleware) -> ServerResult<()> {
        self.with_setup("add middleware", |setup| {
            setup.middleware.push(middleware);
            Ok(())
        })
    }

    /// Registers a health check.
    pub fn register_check(&self, name: impl Into<String>, probe: impl HealthProbe) -> ServerResult<()> {
        self.with_setup("register health check", |_| {
            self.inner.health.register(name, probe)?;
            Ok(())
        })
    }

    fn build_pipeline(&self, user: Vec<BoxedMiddleware>) -> Pipeline {
        let config = &self.inner.config;
        let features = config.features;

        let request_id = if config.trust_request_id {
            RequestIdMiddleware::trust_incoming()
        } else {
            RequestIdMiddleware::new()
        };
        let mut builder = Pipeline::builder()
            .with(RecoveryMiddleware::new())
            .with(request_id);
        if features.logging {
            builder = builder.with(LoggingMiddleware::new());
        }
        if features.metrics {
            builder = builder.with(MetricsMiddleware::new(Arc::clone(&self.inner.metrics)));
        }
        if features.cors {
            builder = builder.with(CorsMiddleware::new());
        }
        builder = builder.with(SecurityHeadersMiddleware::new());
        if let Some(limit) = config.rate_limit {
            builder = builder.with(
                RateLimitMiddleware::builder()
                    .limit(limit.requests)
                    .window(limit.window)
                    .per_ip()
                    .clock(Arc::clone(&self.inner.clock))
                    .build(),
            );
        }
        builder = builder
            .with(TimeoutMiddleware::new(config.request_timeout))
            .with(BodyLimitMiddleware::new(config.max_body_bytes));
        if features.compression {
            builder = builder.with(CompressionMiddleware::new());
        }
        if let Some(mount) = &config.static_files {
            builder = builder.with(StaticFiles::new(mount.dir.clone(), mount.prefix.clone()));
        }
        builder.extend(user).build()
    }

    /// Binds the listener and serves until shutdown begins.
    ///
    /// Returns once the server stops accepting connections; connections
    /// still open are finished by [`shutdown`](Self::shutdown). Fails if the
    /// server is not in the configured state, or the listener or TLS
    /// material cannot be set up; in that case the server is stopped.
    pub async fn start(&self) -> ServerResult<()> {
        let inner = &self.inner;
        inner
            .state
            .transition("start", LifecycleState::Configured, LifecycleState::Listening)?;

        let setup = inner.setup.lock().take();
        inner.health.freeze();
        let Some(setup) = setup else {
            return Err(LifecycleError::InvalidState {
                operation: "start",
                state: self.state(),
            }
            .into());
        };

        let (listener, local, tls) = match self.bind().await {
            Ok(bound) => bound,
            Err(err) => {
                let _ = inner
                    .state
                    .transition("stop", LifecycleState::Listening, LifecycleState::Stopped);
                inner.local_addr.send_replace(None);
                tracing::error!(error = %err, "server failed to start");
                return Err(err);
            }
        };
        if !self.publish_local_addr(local) {
            tracing::info!(addr = %local, "shutdown began while binding, not serving");
            return Ok(());
        }
        tracing::info!(
            addr = %local,
            tls = tls.is_some(),
            environment = %inner.config.environment,
            "server listening"
        );

        let app = Arc::new(App {
            pipeline: self.build_pipeline(setup.middleware),
            dispatcher: Dispatcher::new(setup.router),
        });
        tracing::debug!(
            stages = ?app.pipeline.stage_names(),
            routes = app.dispatcher.router().len(),
            "request pipeline ready"
        );

        self.spawn_background_loops();
        self.accept_loop(listener, tls, app).await;
        Ok(())
    }

    async fn bind(&self) -> ServerResult<(TcpListener, SocketAddr, Option<TlsAcceptor>)> {
        let config = &self.inner.config;
        let tls = config.tls.as_ref().map(load_tls_acceptor).transpose()?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::listen(&addr, e))?;
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::listen(&addr, e))?;
        Ok((listener, local, tls))
    }

    /// Publishes the bound address unless shutdown has already begun.
    ///
    /// Shutdown moves the state out of listening before it clears the
    /// address, so an address published here is always cleared again.
    fn publish_local_addr(&self, local: SocketAddr) -> bool {
        let inner = &self.inner;
        inner.local_addr.send_if_modified(|slot| {
            if inner.state.get() == LifecycleState::Listening {
                *slot = Some(local);
                true
            } else {
                false
            }
        })
    }

    fn spawn_background_loops(&self) {
        let inner = &self.inner;
        let config = &inner.config;
        let tracker = inner.coordinator.background_tasks();

        if config.features.health {
            spawn_health_loop(
                tracker,
                inner.coordinator.background_token(),
                Arc::clone(&inner.health),
                config.health_interval,
                config.unhealthy_log_policy,
            );
        }
        if config.features.metrics {
            spawn_metrics_loop(
                tracker,
                inner.coordinator.background_token(),
                Arc::clone(&inner.metrics),
                Arc::clone(&inner.sampler),
                config.metrics_interval,
            );
        }
    }

    async fn accept_loop(&self, listener: TcpListener, tls: Option<TlsAcceptor>, app: Arc<App>) {
        let drain = self.inner.coordinator.drain_signal().recv();
        tokio::pin!(drain);

        loop {
            let (stream, remote) = tokio::select! {
                biased;
                () = &mut drain => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let inner = Arc::clone(&self.inner);
            let app = Arc::clone(&app);
            let tls = tls.clone();
            self.inner
                .coordinator
                .connections()
                .spawn(handle_connection(inner, app, stream, remote, tls));
        }

        drop(listener);
        tracing::info!("stopped accepting connections");
    }

    /// Waits until the listener is bound and returns its address.
    ///
    /// Fails if the server stops before it binds.
    pub async fn wait_until_listening(&self) -> ServerResult<SocketAddr> {
        let mut rx = self.inner.local_addr.subscribe();
        loop {
            if let Some(addr) = *rx.borrow_and_update() {
                return Ok(addr);
            }
            let state = self.state();
            if matches!(state, LifecycleState::ShuttingDown | LifecycleState::Stopped) {
                return Err(LifecycleError::InvalidState {
                    operation: "wait for listener",
                    state,
                }
                .into());
            }
            if rx.changed().await.is_err() {
                return Err(LifecycleError::InvalidState {
                    operation: "wait for listener",
                    state: self.state(),
                }
                .into());
            }
        }
    }

    /// Shuts the server down gracefully.
    ///
    /// Readiness turns to not ready, the background loops stop, the accept
    /// loop stops and open connections get until `timeout` to finish. Past
    /// the timeout the remaining connections are dropped and
    /// [`ServerError::ShutdownTimeoutExceeded`] is returned; the server is
    /// stopped either way.
    ///
    /// Calling it again, concurrently or later, returns a report with
    /// `already_stopped` set and does nothing else.
    pub async fn shutdown(&self, timeout: Duration) -> ServerResult<ShutdownReport> {
        let inner = &self.inner;
        let repeated = ShutdownReport {
            connections_at_start: 0,
            elapsed: Duration::ZERO,
            already_stopped: true,
        };

        if !inner.coordinator.begin() {
            tracing::debug!("shutdown already requested");
            return Ok(repeated);
        }

        loop {
            let state = inner.state.get();
            if !matches!(state, LifecycleState::Configured | LifecycleState::Listening) {
                return Ok(repeated);
            }
            if inner
                .state
                .transition("shut down", state, LifecycleState::ShuttingDown)
                .is_ok()
            {
                break;
            }
        }

        inner.health.freeze();
        inner.health.set_accepting(false);
        tracing::info!("shutting down");

        let result = inner.coordinator.run(timeout).await;
        let _ = inner
            .state
            .transition("stop", LifecycleState::ShuttingDown, LifecycleState::Stopped);
        inner.local_addr.send_replace(None);

        if let Ok(report) = &result {
            tracing::info!(
                connections = report.connections_at_start,
                elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                "server stopped"
            );
        }
        result
    }

    /// Serves until SIGINT or SIGTERM, then shuts down with the configured
    /// timeout.
    ///
    /// Startup errors are returned as soon as they happen.
    pub async fn run(&self) -> ServerResult<()> {
        let server = self.clone();
        let mut serving = tokio::spawn(async move { server.start().await });

        let signal = async {
            match wait_for_os_signal().await {
                Ok(name) => tracing::info!(signal = name, "received shutdown signal"),
                Err(err) => {
                    tracing::error!(error = %err, "cannot listen for shutdown signals");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            () = signal => {}
            joined = &mut serving => return flatten(joined),
        }

        let shutdown = self.shutdown(self.inner.config.shutdown_timeout).await;
        flatten(serving.await)?;
        shutdown.map(|_| ())
    }
}

fn flatten(joined: Result<ServerResult<()>, tokio::task::JoinError>) -> ServerResult<()> {
    joined.map_err(|err| ServerError::HandlerFault(format!("server task failed: {err}")))?
}

/// Connection bookkeeping for the idle timeout.
#[derive(Debug)]
struct Activity {
    in_flight: AtomicUsize,
    last: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        }
    }

    fn begin(&self) -> ActivityGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Instant::now();
        ActivityGuard { activity: self }
    }

    /// When the connection becomes idle if nothing else happens.
    fn idle_deadline(&self, idle: Duration) -> Instant {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            Instant::now() + idle
        } else {
            *self.last.lock() + idle
        }
    }

    fn is_idle(&self, idle: Duration) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.last.lock().elapsed() >= idle
    }
}

struct ActivityGuard<'a> {
    activity: &'a Activity,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        *self.activity.last.lock() = Instant::now();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_connection(
    inner: Arc<Inner>,
    app: Arc<App>,
    stream: TcpStream,
    remote: SocketAddr,
    tls: Option<TlsAcceptor>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(%remote, error = %err, "failed to set TCP_NODELAY");
    }

    let Some(acceptor) = tls else {
        serve_connection(&inner, app, stream, remote, false).await;
        return;
    };

    let handshake = tokio::time::timeout(inner.config.read_timeout, acceptor.accept(stream));
    let tls_stream = tokio::select! {
        biased;
        () = inner.coordinator.force_signal().recv() => return,
        result = handshake => match result {
            Ok(Ok(tls_stream)) => tls_stream,
            Ok(Err(err)) => {
                tracing::debug!(%remote, error = %err, "TLS handshake failed");
                return;
            }
            Err(_) => {
                tracing::debug!(%remote, "TLS handshake timed out");
                return;
            }
        },
    };
    serve_connection(&inner, app, tls_stream, remote, true).await;
}

async fn serve_connection<IO>(inner: &Inner, app: Arc<App>, io: IO, remote: SocketAddr, tls: bool)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let config = &inner.config;
    let write_timeout = config.write_timeout;
    let idle_timeout = config.idle_timeout;
    let activity = Arc::new(Activity::new());
    let root = inner.coordinator.request_root().clone();

    let service = {
        let activity = Arc::clone(&activity);
        service_fn(move |request: http::Request<Incoming>| {
            let app = Arc::clone(&app);
            let activity = Arc::clone(&activity);
            let root = root.clone();
            async move {
                let _active = activity.begin();
                let request = request.map(|body| body.map_err(BoxError::from).boxed());
                let mut ctx = MiddlewareContext::for_connection(Some(remote), tls, &root);

                let result =
                    tokio::time::timeout(write_timeout, app.handle(&mut ctx, request)).await;
                if result.is_err() {
                    tracing::warn!(
                        %remote,
                        request_id = %ctx.request_id(),
                        "response not written within the write timeout, closing connection"
                    );
                }
                result
            }
        })
    };

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(config.read_timeout)
        .max_buf_size(config.max_header_bytes)
        .keep_alive(true);
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let drain = inner.coordinator.drain_signal().recv();
    let force = inner.coordinator.force_signal().recv();
    tokio::pin!(drain, force);
    let mut closing = false;

    loop {
        let idle_at = activity.idle_deadline(idle_timeout);
        tokio::select! {
            biased;
            () = &mut force => {
                tracing::debug!(%remote, "connection closed forcibly");
                return;
            }
            result = conn.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(%remote, error = %err, "connection ended with error");
                }
                return;
            }
            () = &mut drain, if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            () = tokio::time::sleep_until(idle_at), if !closing => {
                if activity.is_idle(idle_timeout) {
                    tracing::debug!(%remote, "closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}

/// Builder for [`Server`].
///
/// ```rust
/// use heron_server::Server;
/// use std::time::Duration;
///
/// let server = Server::builder()
///     .host("127.0.0.1")
///     .port(0)
///     .shutdown_timeout(Duration::from_secs(5))
///     .build()
///     .unwrap();
/// assert_eq!(server.config().port, 0);
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    clock: Option<SharedClock>,
    sampler: Option<Arc<dyn ProcessSampler>>,
    version: String,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            clock: None,
            sampler: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the bind host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the bind port; 0 picks a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the timeout [`Server::run`] uses for shutdown.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the per-request deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Reuses a well-formed incoming `X-Request-ID` instead of generating one.
    pub fn trust_request_id(mut self, trust: bool) -> Self {
        self.config.trust_request_id = trust;
        self
    }

    /// Enables per-client rate limiting.
    pub fn rate_limit(mut self, requests: u64, window: Duration) -> Self {
        self.config.rate_limit = Some(RateLimit { requests, window });
        self
    }

    /// Sets the feature toggles.
    pub fn features(mut self, features: Features) -> Self {
        self.config.features = features;
        self
    }

    /// Serves `dir` under `prefix`.
    pub fn static_files(mut self, dir: impl Into<std::path::PathBuf>, prefix: impl Into<String>) -> Self {
        self.config.static_files = Some(StaticMount {
            dir: dir.into(),
            prefix: prefix.into(),
        });
        self
    }

    /// Serves HTTPS with the given PEM files.
    pub fn tls(mut self, cert_file: impl Into<std::path::PathBuf>, key_file: impl Into<std::path::PathBuf>) -> Self {
        self.config.tls = Some(TlsPaths {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        });
        self
    }

    /// Sets the clock used for uptime and rate limit windows.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the process sampler polled by the metrics loop.
    pub fn sampler(mut self, sampler: impl ProcessSampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Sets the version reported by the health endpoint.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Validates the configuration and creates the server.
    ///
    /// The built-in endpoints are registered here, ahead of any user route.
    pub fn build(self) -> ServerResult<Server> {
        let state = StateCell::new(LifecycleState::Created);
        self.config.validate()?;

        let config = self.config;
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let health = Arc::new(
            HealthRegistry::with_clock(self.version, Arc::clone(&clock))
                .with_critical_checks(config.critical_checks.clone()),
        );
        let metrics = Arc::new(MetricsRegistry::with_clock(
            config.sample_capacity,
            Arc::clone(&clock),
        ));

        let mut router = Router::new();
        if config.features.health {
            endpoints::register_health(&mut router, &health, config.health_endpoint_mode)
                .map_err(route_error)?;
        }
        if config.features.metrics {
            endpoints::register_metrics(&mut router, &metrics).map_err(route_error)?;
        }

        state.transition("configure", LifecycleState::Created, LifecycleState::Configured)?;
        let (local_addr, _) = watch::channel(None);

        Ok(Server {
            inner: Arc::new(Inner {
                config,
                state,
                setup: Mutex::new(Some(Setup {
                    router,
                    middleware: Vec::new(),
                })),
                health,
                metrics,
                sampler: self
                    .sampler
                    .unwrap_or_else(|| Arc::new(RuntimeSampler)),
                clock,
                coordinator: ShutdownCoordinator::new(),
                local_addr,
            }),
        })
    }
}
