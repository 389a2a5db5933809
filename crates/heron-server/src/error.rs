//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

use crate::lifecycle::LifecycleError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised by the server.
///
/// Startup errors (`Configuration`, `Listen`, `Tls`) are fatal and are
/// returned from [`Server::start`](crate::Server::start). Per-request
/// outcomes such as `RouteNotFound` or `RateLimitExceeded` never reach the
/// caller of `start`; they are answered with a response and exist here so
/// that logs and hosts can name them.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration detected at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The listening socket could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        /// Address the server tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No route matched and no fallback is registered.
    #[error("no route for {method} {path}")]
    RouteNotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// A handler failed unexpectedly.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// At least one health check reported unhealthy.
    #[error("health check '{name}' failed: {reason}")]
    HealthCheckFailure {
        /// Name of the failing check.
        name: String,
        /// Reported failure.
        reason: String,
    },

    /// In-flight connections were still open when the shutdown timeout
    /// elapsed and were closed forcibly.
    #[error("shutdown timeout exceeded, {remaining} connection(s) closed forcibly")]
    ShutdownTimeoutExceeded {
        /// Connections still open at the deadline.
        remaining: usize,
    },

    /// A client exceeded its rate limit.
    #[error("rate limit exceeded for {client}")]
    RateLimitExceeded {
        /// Client key.
        client: String,
    },

    /// An operation was not valid in the current lifecycle state.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// TLS material could not be loaded.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl ServerError {
    /// Creates a [`ServerError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a [`ServerError::Listen`].
    pub fn listen(addr: impl ToString, source: std::io::Error) -> Self {
        Self::Listen {
            addr: addr.to_string(),
            source,
        }
    }

    /// Creates a [`ServerError::Tls`].
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Returns true if the error stops the server from running.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Listen { .. } | Self::Tls(_) | Self::Lifecycle(_)
        )
    }
}

impl From<heron_config::ConfigError> for ServerError {
    fn from(err: heron_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Formats a listen address for error messages.
pub(crate) fn describe_addr(host: &str, port: u16) -> String {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{host}:{port}"),
    }
}
