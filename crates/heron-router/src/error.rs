//! Route registration errors.

use thiserror::Error;

/// Errors raised while registering routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The method is neither `*` nor a valid HTTP method token.
    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    /// The path pattern is malformed.
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The `*` path is reserved for the `("*", "*")` fallback route.
    #[error("path '*' is reserved for the fallback route and requires method '*'")]
    ReservedPattern,

    /// A fallback route was already registered.
    #[error("a fallback route is already registered")]
    FallbackAlreadySet,
}
