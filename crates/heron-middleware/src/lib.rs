//! # Heron Middleware
//!
//! Middleware pipeline and built-in stages for the Heron server runtime.
//!
//! ## Ordering
//!
//! Global middleware runs in registration order, outermost first. Route
//! middleware runs inside all global middleware, right around the handler:
//!
//! ```text
//! Request → A → B → (routing) → C → handler
//! Response ← A ← B ←─────────── C ←──┘
//! ```
//!
//! A stage can stop the chain by returning its own response without calling
//! [`Next::run`], which is how CORS preflight replies and rate limiting work.
//!
//! ## Example
//!
//! ```ignore
//! use heron_middleware::{Pipeline, stages::{RecoveryMiddleware, RequestIdMiddleware}};
//!
//! let pipeline = Pipeline::builder()
//!     .with(RecoveryMiddleware::new())
//!     .with(RequestIdMiddleware::new())
//!     .build();
//! assert_eq!(pipeline.stage_names(), vec!["recovery", "request_id"]);
//! ```

#![doc(html_root_url = "https://docs.rs/heron-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use context::{Fault, MiddlewareContext};
pub use middleware::{BoxFuture, Endpoint, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
pub use types::{Body, Request, Response, ResponseExt};
