//! Built-in middleware stages.
//!
//! The server installs these in a fixed default order, each one only when
//! its feature is enabled:
//!
//! 1. [`recovery`] - Turn panics and handler faults into one 500 response
//! 2. [`request_id`] - Assign a UUID v7 request ID
//! 3. [`logging`] - One access log event per request
//! 4. [`metrics`] - Request counters, latency history, `X-Response-Time`
//! 5. [`cors`] - Access-control headers and preflight replies
//! 6. [`security_headers`] - Fixed security headers, HSTS over TLS
//! 7. [`rate_limit`] - Fixed-window rate limiting per client
//! 8. [`timeout`] - Request deadline and cooperative cancellation
//! 9. [`body_limit`] - Request body size limit
//! 10. [`compression`] - gzip, deflate or brotli response bodies
//!
//! User middleware registered on the server runs inside all of them.

pub mod body_limit;
pub mod compression;
pub mod cors;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;
pub mod security_headers;
pub mod timeout;

pub use body_limit::BodyLimitMiddleware;
pub use compression::{CompressionBuilder, CompressionMiddleware, Encoding};
pub use cors::{AllowedOrigins, CorsBuilder, CorsConfig, CorsMiddleware};
pub use logging::LoggingMiddleware;
pub use metrics::{MetricsMiddleware, OTHER_METHOD, UNMATCHED_ROUTE};
pub use rate_limit::{KeyExtractor, RateLimitBuilder, RateLimitConfig, RateLimitMiddleware};
pub use recovery::RecoveryMiddleware;
pub use request_id::RequestIdMiddleware;
pub use security_headers::SecurityHeadersMiddleware;
pub use timeout::TimeoutMiddleware;
