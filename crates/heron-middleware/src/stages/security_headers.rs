//! Security response headers.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use http::header::{self, HeaderName, HeaderValue};

/// Value of `Strict-Transport-Security` sent over TLS.
pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Adds a fixed set of security headers to every response.
///
/// `Strict-Transport-Security` is only sent when the request arrived over
/// TLS. Headers already present on the response are left alone, so a
/// handler can loosen the content security policy for a single route.
#[derive(Debug, Clone)]
pub struct SecurityHeadersMiddleware {
    headers: Vec<(HeaderName, HeaderValue)>,
    hsts: Option<HeaderValue>,
}

impl SecurityHeadersMiddleware {
    /// Creates the middleware with the default header set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: vec![
                (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
                (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
                (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
                (
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static("default-src 'self'"),
                ),
                (
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ),
            ],
            hsts: Some(HeaderValue::from_static(HSTS_VALUE)),
        }
    }

    /// Replaces the value of one header in the set, or adds it.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Never send `Strict-Transport-Security`, even over TLS.
    #[must_use]
    pub fn without_hsts(mut self) -> Self {
        self.hsts = None;
        self
    }
}

impl Default for SecurityHeadersMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for SecurityHeadersMiddleware {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut response = next.run(ctx, request).await;
            let target = response.headers_mut();

            for (name, value) in &self.headers {
                if !target.contains_key(name) {
                    target.insert(name.clone(), value.clone());
                }
            }

            if ctx.is_tls() {
                if let Some(hsts) = &self.hsts {
                    if !target.contains_key(header::STRICT_TRANSPORT_SECURITY) {
                        target.insert(header::STRICT_TRANSPORT_SECURITY, hsts.clone());
                    }
                }
            }

            response
        })
    }
}
