//! # Heron Server
//!
//! HTTP server, lifecycle, health and graceful shutdown for the Heron server
//! runtime.
//!
//! This crate ties the other Heron crates together:
//!
//! - HTTP/1.1 serving via Hyper, optionally over TLS
//! - Ordered routing with per-route middleware
//! - The built-in middleware chain
//! - Health checks with `/api/v1/health`, `/ready` and `/live` endpoints
//! - Request and process metrics at `/api/v1/metrics`
//! - Graceful shutdown with a forced close after a timeout
//!
//! ## Lifecycle
//!
//! ```text
//! Created → Configured → Listening → ShuttingDown → Stopped
//! ```
//!
//! Routes, middleware and health checks can only be registered before
//! [`Server::start`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use heron_core::{envelope, HandlerResult, Request, RequestContext};
//! use heron_server::{Server, ServerConfig};
//! use http::StatusCode;
//!
//! async fn ping(_ctx: RequestContext, _req: Request) -> HandlerResult {
//!     Ok(envelope::text(StatusCode::OK, "pong"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), heron_server::ServerError> {
//!     let server = Server::new(ServerConfig::default())?;
//!     server.get("/ping", ping)?;
//!     server.run().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/heron-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod background;
pub mod config;
mod endpoints;
pub mod error;
pub mod handler;
pub mod health;
pub mod lifecycle;
mod server;
pub mod shutdown;
pub mod static_files;
pub mod tls;

pub use config::{Features, RateLimit, ServerConfig, StaticMount, TlsPaths};
pub use endpoints::{HEALTH_PATH, LIVE_PATH, METRICS_PATH, READY_PATH};
pub use error::{ServerError, ServerResult};
pub use handler::{Dispatcher, Handler, RouteEntry};
pub use health::{
    CheckResult, HealthProbe, HealthRegistry, HealthStatus, OverallStatus, Readiness,
    UnhealthyLogPolicy, DEFAULT_CRITICAL_CHECKS,
};
pub use lifecycle::{LifecycleError, LifecycleState};
pub use server::{Server, ServerBuilder};
pub use shutdown::{wait_for_os_signal, ShutdownReport, ShutdownSignal};
pub use static_files::{StaticFileError, StaticFiles};
pub use tls::load_tls_acceptor;
