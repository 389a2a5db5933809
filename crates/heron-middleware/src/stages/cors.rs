//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! Adds access-control headers to every response and answers preflight
//! requests directly with `200 OK`, without running the rest of the chain.
//!
//! A preflight is an `OPTIONS` request that carries an `Origin` header. A
//! bare `OPTIONS` request is not a CORS request, so it passes through to the
//! router like any other method and gets a 404 unless a route handles it.
//!
//! ## Example
//!
//! ```ignore
//! use heron_middleware::stages::CorsMiddleware;
//! use http::Method;
//! use std::time::Duration;
//!
//! let cors = CorsMiddleware::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_methods([Method::GET, Method::POST])
//!     .allow_headers(["Content-Type", "Authorization", "X-Request-ID"])
//!     .max_age(Duration::from_secs(3600))
//!     .build();
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::Full;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// CORS middleware.
///
/// # Preflight Handling
///
/// An `OPTIONS` request carrying an `Origin` header is a preflight: the
/// middleware replies `200 OK` with the configured allow headers and does not
/// call the next stage.
///
/// # Regular Requests
///
/// The request runs normally. If its origin is allowed, the response gets
/// `Access-Control-Allow-Origin`, plus `Access-Control-Allow-Credentials`
/// and `Access-Control-Expose-Headers` when configured.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    config: CorsConfig,
}

/// Configuration for CORS middleware.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allowed_origins: AllowedOrigins,
    allowed_methods: Vec<Method>,
    allowed_headers: Vec<String>,
    expose_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

/// Represents the set of allowed origins.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Allow any origin (wildcard `*`).
    Any,
    /// Allow specific origins.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Returns the `Access-Control-Allow-Origin` value for a request origin.
    ///
    /// A request without an `Origin` header gets `*` only when any origin is
    /// allowed.
    pub fn header_value(&self, origin: Option<&str>) -> Option<HeaderValue> {
        match (self, origin) {
            (Self::Any, _) => Some(HeaderValue::from_static("*")),
            (Self::List(origins), Some(origin)) if origins.iter().any(|o| o == origin) => {
                HeaderValue::from_str(origin).ok()
            }
            (Self::List(_), _) => None,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Any,
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: vec![
                "content-type".to_string(),
                "authorization".to_string(),
                "x-request-id".to_string(),
            ],
            expose_headers: vec!["x-request-id".to_string(), "x-response-time".to_string()],
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

/// Builder for CORS configuration.
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    config: CorsConfig,
}

impl CorsBuilder {
    /// Creates a new CORS builder with default settings (any origin).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin (wildcard `*`).
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.config.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Restricts the allowed origins to an explicit list, adding `origin`.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        match &mut self.config.allowed_origins {
            AllowedOrigins::List(origins) => {
                if !origins.contains(&origin) {
                    origins.push(origin);
                }
            }
            AllowedOrigins::Any => self.config.allowed_origins = AllowedOrigins::List(vec![origin]),
        }
        self
    }

    /// Sets the allowed HTTP methods.
    #[must_use]
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.config.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Sets the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Sets headers that should be exposed to JavaScript.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.expose_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Sets whether to allow credentials (cookies, authorization headers).
    ///
    /// Browsers ignore credentials when the allowed origin is `*`.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    /// Sets the max age for preflight cache.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.config.max_age = Some(duration);
        self
    }

    /// Builds the CORS middleware.
    #[must_use]
    pub fn build(self) -> CorsMiddleware {
        CorsMiddleware {
            config: self.config,
        }
    }
}

impl CorsMiddleware {
    /// Creates a new CORS builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Creates a CORS middleware with default settings.
    #[must_use]
    pub fn new() -> Self {
        CorsBuilder::new().build()
    }

    fn origin(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(headers::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    /// Headers shared by preflight and regular responses.
    fn apply_common(&self, target: &mut HeaderMap, origin: Option<&str>) {
        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            target.insert(headers::ALLOW_ORIGIN, value);
        }
        if self.config.allow_credentials {
            target.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if matches!(self.config.allowed_origins, AllowedOrigins::List(_)) {
            target.append(headers::VARY, HeaderValue::from_static("Origin"));
        }
    }

    /// Creates the 200 preflight response.
    fn preflight_response(&self, origin: Option<&str>) -> Response {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::OK;
        let target = response.headers_mut();
        self.apply_common(target, origin);

        let methods: Vec<&str> = self.config.allowed_methods.iter().map(Method::as_str).collect();
        insert_joined(target, headers::ALLOW_METHODS, &methods);

        let allowed: Vec<&str> = self.config.allowed_headers.iter().map(String::as_str).collect();
        insert_joined(target, headers::ALLOW_HEADERS, &allowed);

        if let Some(max_age) = self.config.max_age {
            target.insert(headers::MAX_AGE, HeaderValue::from(max_age.as_secs()));
        }
        response
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_joined(target: &mut HeaderMap, name: &'static str, values: &[&str]) {
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
        target.insert(name, value);
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let origin = Self::origin(&request).map(str::to_owned);

            if request.method() == Method::OPTIONS && origin.is_some() {
                return self.preflight_response(origin.as_deref());
            }

            let mut response = next.run(ctx, request).await;
            let target = response.headers_mut();
            self.apply_common(target, origin.as_deref());

            let exposed: Vec<&str> = self.config.expose_headers.iter().map(String::as_str).collect();
            insert_joined(target, headers::EXPOSE_HEADERS, &exposed);
            response
        })
    }
}
