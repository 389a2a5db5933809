//! # Heron Core
//!
//! Core types and traits for the Heron server runtime.
//!
//! This crate provides the foundational types used throughout Heron:
//!
//! - [`RequestContext`] - Per-request context handed to handlers
//! - [`RequestId`] - UUID v7 request identifier
//! - [`HandlerError`] - Errors a handler may return
//! - [`Clock`] - Injectable time source for windows and uptime
//! - [`envelope`] - JSON response envelope used by built-in endpoints

#![doc(html_root_url = "https://docs.rs/heron-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
mod clock;
mod context;
pub mod envelope;
mod error;

pub use body::{Body, BoxError, Request, Response};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::{RequestContext, RequestId};
pub use error::{HandlerError, HandlerResult};
