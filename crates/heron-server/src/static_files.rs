//! Static file serving.
//!
//! [`StaticFiles`] is a middleware stage. `GET` and `HEAD` requests under its
//! URL prefix are answered from a directory; everything else, including
//! files that do not exist, continues down the chain to the router.
//!
//! # Security
//!
//! - `..` segments are rejected before touching the filesystem
//! - hidden files (a segment starting with `.`) are refused unless enabled
//! - the resolved path must stay inside the canonical root, so symlinks
//!   pointing outside it are refused
//!
//! # Example
//!
//! ```rust
//! use heron_server::StaticFiles;
//!
//! let files = StaticFiles::new("./public", "/static")
//!     .index("index.html")
//!     .cache_control("max-age=3600");
//! assert_eq!(files.prefix(), "/static");
//! ```

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use heron_core::{envelope, Request, Response};
use heron_middleware::{BoxFuture, Middleware, MiddlewareContext, Next};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::Full;
use thiserror::Error;

/// Errors while serving a static file.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// The file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is not allowed.
    #[error("forbidden path: {0}")]
    Forbidden(&'static str),

    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StaticFileError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Serves files from a directory under a URL prefix.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    prefix: String,
    index_file: Option<String>,
    cache_control: Option<String>,
    serve_hidden: bool,
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Serves `root` under `prefix`.
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            prefix,
            index_file: Some("index.html".to_string()),
            cache_control: None,
            serve_hidden: false,
            mime_types: HashMap::new(),
        }
    }

    /// Sets the file served for directory requests.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index_file = Some(index.into());
        self
    }

    /// Disables index files.
    pub fn no_index(mut self) -> Self {
        self.index_file = None;
        self
    }

    /// Sets the `Cache-Control` header of file responses.
    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Allows serving files whose name starts with `.`.
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Maps an extension to a content type, overriding the built-in table.
    pub fn mime_type(mut self, extension: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.mime_types
            .insert(extension.into().to_lowercase(), content_type.into());
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the URL prefix, without a trailing slash.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the path below the prefix, or `None` if `path` is outside it.
    fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Answers a request for `relative`, a path below the prefix.
    pub async fn serve(
        &self,
        relative: &str,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<Response, StaticFileError> {
        let mut path = self.resolve(relative).await?;

        let mut metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            let index = self
                .index_file
                .as_ref()
                .ok_or_else(|| StaticFileError::NotFound(relative.to_string()))?;
            path = path.join(index);
            metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|_| StaticFileError::NotFound(relative.to_string()))?;
        }
        if !metadata.is_file() {
            return Err(StaticFileError::NotFound(relative.to_string()));
        }

        let modified = metadata.modified().ok();
        if let (Some(modified), Some(since)) = (modified, if_modified_since(headers)) {
            if unix_secs(modified) <= unix_secs(since) {
                return Ok(self.not_modified());
            }
        }

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(tokio::fs::read(&path).await?)
        };

        let mut response = Response::new(Full::new(body));
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type(&path)) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&metadata.len().to_string()) {
            headers.insert(header::CONTENT_LENGTH, value);
        }
        if let Some(modified) = modified {
            if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
                headers.insert(header::LAST_MODIFIED, value);
            }
        }
        self.insert_cache_control(headers);
        Ok(response)
    }

    async fn resolve(&self, relative: &str) -> Result<PathBuf, StaticFileError> {
        let relative = relative.trim_start_matches('/');

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden("directory traversal"));
                }
                Component::Normal(name) => {
                    if !self.serve_hidden && name.to_string_lossy().starts_with('.') {
                        return Err(StaticFileError::Forbidden("hidden file"));
                    }
                }
                _ => {}
            }
        }

        let root = tokio::fs::canonicalize(&self.root).await?;
        let resolved = tokio::fs::canonicalize(root.join(relative))
            .await
            .map_err(|_| StaticFileError::NotFound(relative.to_string()))?;

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(StaticFileError::Forbidden("path escapes root"))
        }
    }

    fn content_type(&self, path: &Path) -> String {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        if let Some(custom) = self.mime_types.get(&extension) {
            return custom.clone();
        }

        match extension.as_str() {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "xml" => "application/xml",
            "txt" => "text/plain; charset=utf-8",
            "csv" => "text/csv; charset=utf-8",
            "md" => "text/markdown; charset=utf-8",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "wasm" => "application/wasm",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mp3" => "audio/mpeg",
            _ => "application/octet-stream",
        }
        .to_string()
    }

    fn not_modified(&self) -> Response {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        self.insert_cache_control(response.headers_mut());
        response
    }

    fn insert_cache_control(&self, headers: &mut HeaderMap) {
        if let Some(value) = self
            .cache_control
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }
}

fn if_modified_since(headers: &HeaderMap) -> Option<SystemTime> {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Middleware for StaticFiles {
    fn name(&self) -> &'static str {
        "static_files"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method();
            if method != Method::GET && method != Method::HEAD {
                return next.run(ctx, request).await;
            }
            let Some(relative) = self.strip_prefix(request.uri().path()) else {
                return next.run(ctx, request).await;
            };

            match self.serve(relative, request.headers(), request.method()).await {
                Ok(response) => {
                    ctx.set_route(format!("{}/*", self.prefix));
                    response
                }
                Err(StaticFileError::NotFound(_)) => next.run(ctx, request).await,
                Err(err) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        path = %request.uri().path(),
                        error = %err,
                        "static file refused"
                    );
                    let status = err.status_code();
                    if status == StatusCode::FORBIDDEN {
                        envelope::error(status, "FORBIDDEN", "forbidden")
                    } else {
                        envelope::internal_error()
                    }
                }
            }
        })
    }
}
