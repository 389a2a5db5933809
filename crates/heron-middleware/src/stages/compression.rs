//! Response compression.
//!
//! Negotiates an encoding from the request's `Accept-Encoding` header
//! (quality values included) and compresses buffered response bodies with
//! gzip, deflate or brotli.
//!
//! ## Example
//!
//! ```ignore
//! use heron_middleware::stages::{CompressionMiddleware, Encoding};
//!
//! let compression = CompressionMiddleware::builder()
//!     .encodings([Encoding::Brotli, Encoding::Gzip])
//!     .min_size(512)
//!     .build();
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use bytes::Bytes;
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use http::{header, HeaderValue};
use http_body_util::{BodyExt, Full};
use std::io::Write;

/// A content coding the middleware can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// gzip (RFC 1952).
    Gzip,
    /// zlib-wrapped deflate (RFC 1950).
    Deflate,
    /// Brotli (RFC 7932).
    Brotli,
}

impl Encoding {
    /// The `Content-Encoding` token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            _ => None,
        }
    }

    fn encode(self, data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level.min(9)));
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Brotli => {
                let mut output = Vec::new();
                let params = brotli::enc::BrotliEncoderParams {
                    quality: i32::try_from(level.min(11)).unwrap_or(6),
                    ..Default::default()
                };
                brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)?;
                Ok(output)
            }
        }
    }
}

/// Content types that are never worth compressing.
const INCOMPRESSIBLE: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "audio/mpeg",
    "video/mp4",
    "video/webm",
    "application/gzip",
    "application/zip",
    "application/pdf",
    "application/octet-stream",
];

/// Content types compressed besides every `text/*` type.
const COMPRESSIBLE: &[&str] = &[
    "application/json",
    "application/javascript",
    "application/xml",
    "application/xhtml+xml",
    "application/ld+json",
    "application/manifest+json",
    "image/svg+xml",
];

/// Compresses responses for clients that accept it.
///
/// Bodies smaller than `min_size`, responses that already carry a
/// `Content-Encoding` and non-compressible content types are passed through
/// unchanged. `Vary: Accept-Encoding` is always added.
#[derive(Debug, Clone)]
pub struct CompressionMiddleware {
    encodings: Vec<Encoding>,
    min_size: usize,
    level: u32,
}

impl Default for CompressionMiddleware {
    fn default() -> Self {
        Self {
            encodings: vec![Encoding::Brotli, Encoding::Gzip, Encoding::Deflate],
            min_size: 1024,
            level: 6,
        }
    }
}

impl CompressionMiddleware {
    /// Creates the middleware with brotli, gzip and deflate enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CompressionBuilder {
        CompressionBuilder::default()
    }

    /// Picks the encoding for an `Accept-Encoding` value.
    ///
    /// The highest quality wins. Ties are broken by the server's preference
    /// order. `*` matches any enabled encoding not listed explicitly, and a
    /// quality of zero excludes an encoding.
    #[must_use]
    pub fn negotiate(&self, accept_encoding: &str) -> Option<Encoding> {
        let mut explicit: Vec<(Encoding, f32)> = Vec::new();
        let mut wildcard: Option<f32> = None;

        for item in accept_encoding.split(',') {
            let mut parts = item.split(';');
            let token = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            if token.is_empty() {
                continue;
            }
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .map_or(1.0, |q| q.clamp(0.0, 1.0));

            if token == "*" {
                wildcard = Some(quality);
            } else if let Some(encoding) = Encoding::from_token(&token) {
                explicit.push((encoding, quality));
            }
        }

        let quality_of = |encoding: Encoding| {
            explicit
                .iter()
                .find(|(e, _)| *e == encoding)
                .map(|(_, q)| *q)
                .or(wildcard)
        };

        let mut best: Option<(Encoding, f32)> = None;
        for &encoding in &self.encodings {
            match quality_of(encoding) {
                Some(q) if q > 0.0 && best.map_or(true, |(_, b)| q > b) => {
                    best = Some((encoding, q));
                }
                _ => {}
            }
        }
        best.map(|(encoding, _)| encoding)
    }

    fn is_compressible(content_type: &str) -> bool {
        let base = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if INCOMPRESSIBLE.contains(&base.as_str()) {
            return false;
        }
        base.starts_with("text/") || COMPRESSIBLE.contains(&base.as_str())
    }
}

impl Middleware for CompressionMiddleware {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let encoding = request
                .headers()
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| self.negotiate(v));

            let mut response = next.run(ctx, request).await;
            response
                .headers_mut()
                .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));

            let Some(encoding) = encoding else {
                return response;
            };
            if response.headers().contains_key(header::CONTENT_ENCODING) {
                return response;
            }
            let compressible = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(Self::is_compressible);
            if !compressible {
                return response;
            }

            let (mut parts, body) = response.into_parts();
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            if bytes.len() < self.min_size {
                return Response::from_parts(parts, Full::new(bytes));
            }

            match encoding.encode(&bytes, self.level) {
                Ok(compressed) if compressed.len() < bytes.len() => {
                    parts.headers.insert(
                        header::CONTENT_ENCODING,
                        HeaderValue::from_static(encoding.as_str()),
                    );
                    parts.headers.remove(header::CONTENT_LENGTH);
                    Response::from_parts(parts, Full::new(Bytes::from(compressed)))
                }
                Ok(_) => Response::from_parts(parts, Full::new(bytes)),
                Err(error) => {
                    tracing::debug!(%error, encoding = encoding.as_str(), "compression failed");
                    Response::from_parts(parts, Full::new(bytes))
                }
            }
        })
    }
}

/// Builder for [`CompressionMiddleware`].
#[derive(Debug, Clone, Default)]
pub struct CompressionBuilder {
    inner: CompressionMiddleware,
}

impl CompressionBuilder {
    /// Sets the enabled encodings in preference order.
    #[must_use]
    pub fn encodings(mut self, encodings: impl IntoIterator<Item = Encoding>) -> Self {
        self.inner.encodings = encodings.into_iter().collect();
        self
    }

    /// Sets the smallest body that gets compressed. Default: 1024 bytes.
    #[must_use]
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.inner.min_size = min_size;
        self
    }

    /// Sets the compression level (0-9 for gzip and deflate, 0-11 for brotli).
    #[must_use]
    pub fn level(mut self, level: u32) -> Self {
        self.inner.level = level;
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> CompressionMiddleware {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Endpoint;
    use heron_core::{body, envelope};
    use http::StatusCode;
    use std::io::Read;

    struct Fixed {
        content_type: &'static str,
        body: Bytes,
    }

    impl Endpoint for Fixed {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                envelope::with_body(StatusCode::OK, self.body.clone(), self.content_type)
            })
        }
    }

    async fn run(
        middleware: &CompressionMiddleware,
        accept: Option<&str>,
        endpoint: &Fixed,
    ) -> Response {
        let mut builder = http::Request::builder().uri("/");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT_ENCODING, accept);
        }
        let mut ctx = MiddlewareContext::new();
        middleware
            .process(
                &mut ctx,
                builder.body(body::empty()).unwrap(),
                Next::endpoint(endpoint),
            )
            .await
    }

    fn json_body(len: usize) -> Fixed {
        Fixed {
            content_type: "application/json",
            body: Bytes::from(format!("{{\"data\":\"{}\"}}", "a".repeat(len))),
        }
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_negotiate_quality_values() {
        let mw = CompressionMiddleware::new();
        assert_eq!(mw.negotiate("gzip"), Some(Encoding::Gzip));
        assert_eq!(mw.negotiate("gzip;q=0.5, br;q=0.9"), Some(Encoding::Brotli));
        assert_eq!(mw.negotiate("gzip, br"), Some(Encoding::Brotli));
        assert_eq!(mw.negotiate("br;q=0, deflate"), Some(Encoding::Deflate));
        assert_eq!(mw.negotiate("identity"), None);
        assert_eq!(mw.negotiate("*;q=0"), None);
        assert_eq!(mw.negotiate("*"), Some(Encoding::Brotli));
        assert_eq!(mw.negotiate("br;q=0, *"), Some(Encoding::Gzip));
    }

    #[tokio::test]
    async fn test_gzip_round_trip() {
        let endpoint = json_body(4096);
        let response = run(&CompressionMiddleware::new(), Some("gzip"), &endpoint).await;

        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");

        let compressed = body_bytes(response).await;
        assert!(compressed.len() < endpoint.body.len());
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, endpoint.body);
    }

    #[tokio::test]
    async fn test_small_body_is_not_compressed() {
        let endpoint = json_body(10);
        let response = run(&CompressionMiddleware::new(), Some("gzip"), &endpoint).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(response).await, endpoint.body);
    }

    #[tokio::test]
    async fn test_incompressible_type_is_skipped() {
        let endpoint = Fixed {
            content_type: "image/png",
            body: Bytes::from(vec![0_u8; 4096]),
        };
        let response = run(&CompressionMiddleware::new(), Some("gzip, br"), &endpoint).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_no_accept_encoding_still_sets_vary() {
        let endpoint = json_body(4096);
        let response = run(&CompressionMiddleware::new(), None, &endpoint).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");
    }

    #[tokio::test]
    async fn test_brotli() {
        let endpoint = json_body(4096);
        let mw = CompressionMiddleware::builder()
            .encodings([Encoding::Brotli])
            .build();
        let response = run(&mw, Some("br"), &endpoint).await;
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "br");
    }
}
