//! Ordered route table for Heron.
//!
//! Routes are kept in registration order and the first route whose method
//! and path pattern match wins. There is no specificity ranking: a
//! parameterised route registered before a literal one shadows it.
//!
//! # Features
//!
//! - **Path Parameters**: `{name}` segments accept any non-empty segment
//! - **Method Wildcard**: a route registered with method `*` matches any method
//! - **Fallback**: the reserved `("*", "*")` registration answers unmatched requests
//!
//! # Example
//!
//! ```rust
//! use heron_router::{Dispatch, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add_route("GET", "/users/{id}", "getUser").unwrap();
//! router.add_route("GET", "/users/admin", "getAdmin").unwrap();
//! router.add_route("*", "*", "notFound").unwrap();
//!
//! // Registration order decides: the parameterised route shadows the literal one.
//! match router.dispatch(&Method::GET, "/users/admin") {
//!     Dispatch::Matched(m) => {
//!         assert_eq!(*m.value(), "getUser");
//!         assert_eq!(m.params().get("id"), Some("admin"));
//!     }
//!     _ => unreachable!(),
//! }
//!
//! assert!(matches!(router.dispatch(&Method::GET, "/nope"), Dispatch::Fallback(&"notFound")));
//! ```

#![doc(html_root_url = "https://docs.rs/heron-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod pattern;
mod router;

pub use error::RouteError;
pub use params::Params;
pub use pattern::{MethodFilter, PathPattern, PathSegment};
pub use router::{Dispatch, Route, RouteMatch, Router};
