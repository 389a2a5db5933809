//! Rate limiting middleware.
//!
//! Fixed-window counting per client key. Each key gets a counter and the
//! instant its window opened. A request arriving more than one window after
//! that instant starts a fresh window; the request that pushes the counter
//! past the limit is rejected with `429 Too Many Requests`.
//!
//! Every request also sweeps the whole client map and drops keys whose
//! window has expired. That keeps memory bounded without a background task,
//! at the price of an O(n) scan under the lock. With very many distinct
//! clients a sharded map or a periodic sweep would scale better.
//!
//! ## Example
//!
//! ```ignore
//! use heron_middleware::stages::RateLimitMiddleware;
//! use std::time::Duration;
//!
//! let rate_limit = RateLimitMiddleware::builder()
//!     .limit(100)
//!     .window(Duration::from_secs(60))
//!     .per_ip()
//!     .build();
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use heron_core::{SharedClock, SystemClock};
use http::{HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Unix timestamp when the window resets.
    pub const RESET: &str = "x-ratelimit-reset";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Rate limiting middleware.
///
/// # Response Headers
///
/// Allowed requests get:
///
/// - `X-RateLimit-Limit`: Maximum requests allowed
/// - `X-RateLimit-Remaining`: Remaining requests in window
/// - `X-RateLimit-Reset`: Unix timestamp when window resets
///
/// Rejected requests get the same headers plus `Retry-After`, the number of
/// whole seconds left in the client's window.
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    store: Arc<Mutex<RateLimitStore>>,
    clock: SharedClock,
}

/// Configuration for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed per window.
    limit: u64,
    /// Length of a window.
    window: Duration,
    /// How to extract the rate limit key from requests.
    key_extractor: KeyExtractor,
    /// Requests matching this predicate are not counted.
    skip_predicate: Option<Arc<dyn Fn(&Request) -> bool + Send + Sync>>,
    /// Message to return when rate limited.
    error_message: String,
}

impl RateLimitConfig {
    /// Returns the request limit per window.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Clone for RateLimitMiddleware {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// How to extract the rate limit key from a request.
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// First `X-Forwarded-For` entry, else the peer address.
    #[default]
    Ip,
    /// Use a specific header value as the key.
    Header(String),
    /// Use a custom function to extract the key.
    Custom(Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>),
    /// Global rate limit (single key for all requests).
    Global,
}

impl std::fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => write!(f, "KeyExtractor::Ip"),
            Self::Header(h) => f.debug_tuple("KeyExtractor::Header").field(h).finish(),
            Self::Custom(_) => write!(f, "KeyExtractor::Custom(<fn>)"),
            Self::Global => write!(f, "KeyExtractor::Global"),
        }
    }
}

impl std::fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("key_extractor", &self.key_extractor)
            .field("skip_predicate", &self.skip_predicate.is_some())
            .field("error_message", &self.error_message)
            .finish()
    }
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("config", &self.config)
            .field("tracked_clients", &self.tracked_clients())
            .finish_non_exhaustive()
    }
}

/// Per-client counters.
#[derive(Debug, Default)]
struct RateLimitStore {
    entries: HashMap<String, Entry>,
}

/// Counter for one client key.
#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    window_start: Instant,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
            key_extractor: KeyExtractor::default(),
            skip_predicate: None,
            error_message: "Too many requests. Please try again later.".to_string(),
        }
    }
}

/// Builder for rate limit configuration.
#[derive(Clone)]
pub struct RateLimitBuilder {
    config: RateLimitConfig,
    clock: SharedClock,
}

impl Default for RateLimitBuilder {
    fn default() -> Self {
        Self {
            config: RateLimitConfig::default(),
            clock: SystemClock::shared(),
        }
    }
}

impl RateLimitBuilder {
    /// Creates a new rate limit builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of requests allowed per window.
    ///
    /// Default: 100 requests.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.config.limit = limit;
        self
    }

    /// Sets the window length.
    ///
    /// Default: 60 seconds.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Sets the window length in seconds.
    #[must_use]
    pub fn window_secs(self, seconds: u64) -> Self {
        self.window(Duration::from_secs(seconds))
    }

    /// Keys clients by forwarded-for header or peer address.
    #[must_use]
    pub fn per_ip(mut self) -> Self {
        self.config.key_extractor = KeyExtractor::Ip;
        self
    }

    /// Uses a header value as the rate limit key.
    ///
    /// Requests without the header are not limited.
    #[must_use]
    pub fn per_header(mut self, header_name: impl Into<String>) -> Self {
        self.config.key_extractor = KeyExtractor::Header(header_name.into());
        self
    }

    /// Uses a global rate limit (single limit for all requests).
    #[must_use]
    pub fn global(mut self) -> Self {
        self.config.key_extractor = KeyExtractor::Global;
        self
    }

    /// Uses a custom key extractor function.
    #[must_use]
    pub fn key_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
    {
        self.config.key_extractor = KeyExtractor::Custom(Arc::new(f));
        self
    }

    /// Sets a predicate to skip rate limiting for certain requests.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // Never throttle liveness probes
    /// builder.skip(|req| req.uri().path() == "/api/v1/health/live")
    /// ```
    #[must_use]
    pub fn skip<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.config.skip_predicate = Some(Arc::new(f));
        self
    }

    /// Sets the error message returned when rate limited.
    #[must_use]
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.config.error_message = message.into();
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the rate limit middleware.
    #[must_use]
    pub fn build(self) -> RateLimitMiddleware {
        RateLimitMiddleware {
            config: self.config,
            store: Arc::new(Mutex::new(RateLimitStore::default())),
            clock: self.clock,
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimitResult {
    Allowed {
        limit: u64,
        remaining: u64,
        reset_in: Duration,
    },
    Limited {
        limit: u64,
        reset_in: Duration,
    },
}

impl RateLimitMiddleware {
    /// Creates a new rate limit builder.
    #[must_use]
    pub fn builder() -> RateLimitBuilder {
        RateLimitBuilder::new()
    }

    /// Returns the rate limit configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns the number of client keys currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Extracts the rate limit key from a request.
    fn extract_key(&self, request: &Request, ctx: &MiddlewareContext) -> Option<String> {
        match &self.config.key_extractor {
            KeyExtractor::Ip => {
                let forwarded = request
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(str::trim)
                    .filter(|v| !v.is_empty());

                match (forwarded, ctx.remote_addr()) {
                    (Some(ip), _) => Some(ip.to_string()),
                    (None, Some(addr)) => Some(addr.ip().to_string()),
                    (None, None) => Some("unknown".to_string()),
                }
            }
            KeyExtractor::Header(header_name) => request
                .headers()
                .get(header_name)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            KeyExtractor::Custom(f) => f(request),
            KeyExtractor::Global => Some("global".to_string()),
        }
    }

    /// Counts one request for `key` and sweeps expired clients.
    fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        let now = self.clock.now();
        let window = self.config.window;
        let limit = self.config.limit;

        let mut store = self.store.lock();

        let entry = store.entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            window_start: now,
        });
        if now.duration_since(entry.window_start) > window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
        let current = *entry;

        store
            .entries
            .retain(|_, e| now.duration_since(e.window_start) <= window);
        drop(store);

        let reset_in = window.saturating_sub(now.duration_since(current.window_start));
        if current.count > limit {
            RateLimitResult::Limited { limit, reset_in }
        } else {
            RateLimitResult::Allowed {
                limit,
                remaining: limit - current.count,
                reset_in,
            }
        }
    }

    fn reset_timestamp(&self, reset_in: Duration) -> u64 {
        (self.clock.system_now() + reset_in)
            .duration_since(UNIX_EPOCH)
            .map(ceil_secs)
            .unwrap_or_default()
    }

    /// Builds a 429 Too Many Requests response.
    fn build_rate_limit_response(&self, limit: u64, reset_in: Duration) -> Response {
        let retry_after = ceil_secs(reset_in).max(1);
        let mut response = Response::json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            &self.config.error_message,
        );

        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(limit));
        headers.insert(headers::REMAINING, HeaderValue::from(0_u64));
        headers.insert(headers::RESET, HeaderValue::from(self.reset_timestamp(reset_in)));
        headers.insert(headers::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }

    /// Adds rate limit headers to a response.
    fn add_rate_limit_headers(
        &self,
        mut response: Response,
        limit: u64,
        remaining: u64,
        reset_in: Duration,
    ) -> Response {
        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(limit));
        headers.insert(headers::REMAINING, HeaderValue::from(remaining));
        headers.insert(headers::RESET, HeaderValue::from(self.reset_timestamp(reset_in)));
        response
    }
}

/// Whole seconds, rounded up.
fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if let Some(ref predicate) = self.config.skip_predicate {
                if predicate(&request) {
                    return next.run(ctx, request).await;
                }
            }

            let Some(key) = self.extract_key(&request, ctx) else {
                return next.run(ctx, request).await;
            };

            match self.check_rate_limit(&key) {
                RateLimitResult::Allowed {
                    limit,
                    remaining,
                    reset_in,
                } => {
                    let response = next.run(ctx, request).await;
                    self.add_rate_limit_headers(response, limit, remaining, reset_in)
                }
                RateLimitResult::Limited { limit, reset_in } => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        client = %key,
                        "rate limit exceeded"
                    );
                    self.build_rate_limit_response(limit, reset_in)
                }
            }
        })
    }
}
