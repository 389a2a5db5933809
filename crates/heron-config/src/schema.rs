//! Configuration schema types.
//!
//! Every field has a default, so a file only needs to name what it changes.
//! Unknown fields are rejected.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ConfigError;

/// Complete Heron server configuration.
///
/// # Example
///
/// ```
/// use heron_config::HeronConfig;
///
/// let config = HeronConfig::default();
/// assert_eq!(config.server.port, 8080);
/// assert!(config.features.enable_health);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HeronConfig {
    /// Listener and timeout settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Built-in feature toggles.
    #[serde(default)]
    pub features: FeaturesSection,

    /// TLS certificate and key.
    #[serde(default)]
    pub tls: TlsSection,

    /// Static file serving.
    #[serde(default)]
    pub static_files: StaticFilesSection,

    /// Fixed-window rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitSection,

    /// Health check loop and endpoint behavior.
    #[serde(default)]
    pub health: HealthSection,

    /// Metrics collection.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl HeronConfig {
    /// Checks the configuration for values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }

        for (field, value) in [
            ("server.read_timeout_secs", self.server.read_timeout_secs),
            ("server.write_timeout_secs", self.server.write_timeout_secs),
            ("server.idle_timeout_secs", self.server.idle_timeout_secs),
            ("server.shutdown_timeout_secs", self.server.shutdown_timeout_secs),
            ("server.request_timeout_secs", self.server.request_timeout_secs),
            ("health.interval_secs", self.health.interval_secs),
            ("metrics.interval_secs", self.metrics.interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be greater than zero"));
            }
        }

        if self.server.max_header_bytes < MIN_HEADER_BYTES {
            return Err(ConfigError::invalid_value(
                "server.max_header_bytes",
                format!("must be at least {MIN_HEADER_BYTES}"),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.requests == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit.requests",
                    "must be greater than zero",
                ));
            }
            if self.rate_limit.window_secs == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit.window_secs",
                    "must be greater than zero",
                ));
            }
        }

        if self.metrics.sample_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "metrics.sample_capacity",
                "must be greater than zero",
            ));
        }

        if self.tls.cert_file.is_some() != self.tls.key_file.is_some() {
            return Err(ConfigError::invalid_value(
                "tls",
                "cert_file and key_file must be set together",
            ));
        }

        if !self.static_files.prefix.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "static_files.prefix",
                "must start with '/'",
            ));
        }

        Ok(())
    }
}

/// Smallest header buffer hyper accepts.
pub const MIN_HEADER_BYTES: usize = 8192;

/// Listener and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind. `0` lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Time allowed to receive request headers.
    #[serde(default = "default_io_timeout")]
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response.
    #[serde(default = "default_io_timeout")]
    pub write_timeout_secs: u64,

    /// Time an idle keep-alive connection stays open.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Bound on graceful shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request head in bytes.
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    /// Per-request deadline enforced by the timeout stage.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Deployment environment name, reported by the health endpoint.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Reuse a well-formed incoming `X-Request-ID` instead of generating one.
    #[serde(default)]
    pub trust_request_id: bool,
}

impl ServerSection {
    /// Returns `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the header read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Returns the response write timeout.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Returns the keep-alive idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Returns the shutdown bound.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_io_timeout(),
            write_timeout_secs: default_io_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_header_bytes: default_max_header_bytes(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            environment: default_environment(),
            trust_request_id: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_io_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_header_bytes() -> usize {
    1 << 20
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 << 20
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

/// Built-in feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeaturesSection {
    /// Install the CORS stage.
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Install the compression stage.
    #[serde(default = "default_true")]
    pub enable_compression: bool,

    /// Install the access log stage.
    #[serde(default = "default_true")]
    pub enable_logging: bool,

    /// Install the metrics stage, collector and endpoint.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Run the health loop and serve the health endpoints.
    #[serde(default = "default_true")]
    pub enable_health: bool,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            enable_cors: true,
            enable_compression: true,
            enable_logging: true,
            enable_metrics: true,
            enable_health: true,
        }
    }
}

/// TLS certificate chain and private key, both PEM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    /// Certificate chain file.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Private key file.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl TlsSection {
    /// Returns both paths when TLS is configured.
    #[must_use]
    pub fn paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.cert_file.as_ref().zip(self.key_file.as_ref())
    }
}

/// Static file serving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StaticFilesSection {
    /// Directory to serve. Nothing is served when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// URL prefix the directory is mounted at.
    #[serde(default = "default_static_prefix")]
    pub prefix: String,
}

impl Default for StaticFilesSection {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: default_static_prefix(),
        }
    }
}

fn default_static_prefix() -> String {
    "/static".to_string()
}

/// Fixed-window rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    /// Install the rate limit stage.
    #[serde(default)]
    pub enabled: bool,

    /// Requests allowed per client per window.
    #[serde(default = "default_rate_limit_requests")]
    pub requests: u64,

    /// Window length in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub window_secs: u64,
}

impl RateLimitSection {
    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: false,
            requests: default_rate_limit_requests(),
            window_secs: default_rate_limit_window(),
        }
    }
}

fn default_rate_limit_requests() -> u64 {
    100
}

fn default_rate_limit_window() -> u64 {
    60
}

/// What `GET /api/v1/health` returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthEndpointMode {
    /// Run every check for each request.
    #[default]
    Fresh,
    /// Serve the snapshot of the last background run.
    Cached,
}

/// Health check loop and endpoint behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HealthSection {
    /// Seconds between background check runs.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Log on every unhealthy run instead of only on transitions.
    #[serde(default = "default_true")]
    pub log_every_unhealthy_tick: bool,

    /// Behavior of the health endpoint.
    #[serde(default)]
    pub endpoint_mode: HealthEndpointMode,

    /// Checks that decide readiness.
    #[serde(default = "default_critical_checks")]
    pub critical_checks: Vec<String>,
}

impl HealthSection {
    /// Returns the background interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            log_every_unhealthy_tick: true,
            endpoint_mode: HealthEndpointMode::default(),
            critical_checks: default_critical_checks(),
        }
    }
}

fn default_health_interval() -> u64 {
    30
}

fn default_critical_checks() -> Vec<String> {
    ["database", "cache", "storage"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// Metrics collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Seconds between process samples.
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,

    /// Latency samples kept per endpoint.
    #[serde(default = "default_sample_capacity")]
    pub sample_capacity: usize,
}

impl MetricsSection {
    /// Returns the collector interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval(),
            sample_capacity: default_sample_capacity(),
        }
    }
}

fn default_metrics_interval() -> u64 {
    15
}

fn default_sample_capacity() -> usize {
    100
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Level or filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
