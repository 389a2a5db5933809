//! # Heron
//!
//! An HTTP server runtime: ordered routing, a composable middleware
//! pipeline, health and metrics endpoints, and a lifecycle with bounded
//! graceful shutdown.
//!
//! - Routes match in registration order and the first match wins
//! - Global middleware wraps route middleware, which wraps the handler
//! - Health checks run periodically and on demand
//! - Shutdown drains connections, then forces them closed after a timeout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heron::prelude::*;
//! use http::StatusCode;
//!
//! async fn ping(_ctx: RequestContext, _req: Request) -> HandlerResult {
//!     Ok(envelope::text(StatusCode::OK, "pong"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     let server = Server::builder().port(8080).build()?;
//!     server.get("/ping", ping)?;
//!     server.register_check("database", || async { Ok(()) })?;
//!     server.run().await
//! }
//! ```
//!
//! ## Request path
//!
//! ```text
//! Request → Recovery → RequestId → Logging → Metrics → CORS → Security
//!         → RateLimit → Timeout → BodyLimit → Compression → StaticFiles
//!         → user middleware → (routing) → route middleware → handler
//! ```

#![doc(html_root_url = "https://docs.rs/heron/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use heron_core as core;

// Re-export server types
pub use heron_server as server;

// Re-export middleware types
pub use heron_middleware as middleware;

// Re-export router types
pub use heron_router as router;

// Re-export telemetry types
pub use heron_telemetry as telemetry;

// Re-export configuration types
pub use heron_config as config;

/// Prelude module for convenient imports.
///
/// ```rust
/// use heron::prelude::*;
///
/// let server = Server::builder().port(0).build().unwrap();
/// assert_eq!(server.state(), LifecycleState::Configured);
/// ```
pub mod prelude {
    pub use heron_core::{
        envelope, HandlerError, HandlerResult, Request, RequestContext, RequestId, Response,
    };

    pub use heron_middleware::{BoxFuture, Middleware, MiddlewareContext, Next};

    pub use heron_server::{
        Handler, HealthProbe, LifecycleState, Server, ServerBuilder, ServerConfig, ServerError,
        ServerResult, ShutdownReport,
    };

    pub use heron_config::{ConfigLoader, HeronConfig};
}
