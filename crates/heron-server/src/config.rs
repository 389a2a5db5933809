//! Runtime server configuration.
//!
//! [`ServerConfig`] is the resolved form of a [`HeronConfig`]: durations
//! instead of second counts, optional sections collapsed to `Option`s.
//!
//! # Example
//!
//! ```rust
//! use heron_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig {
//!     port: 0,
//!     shutdown_timeout: Duration::from_secs(5),
//!     ..ServerConfig::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use heron_config::{HealthEndpointMode, HeronConfig, MIN_HEADER_BYTES};

use crate::error::{ServerError, ServerResult};
use crate::health::UnhealthyLogPolicy;

/// Built-in features that can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Install the CORS stage.
    pub cors: bool,
    /// Install the compression stage.
    pub compression: bool,
    /// Install the access log stage.
    pub logging: bool,
    /// Install the metrics stage, endpoint and collector.
    pub metrics: bool,
    /// Install the health endpoints and background checks.
    pub health: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            cors: true,
            compression: true,
            logging: true,
            metrics: true,
            health: true,
        }
    }
}

/// Certificate chain and private key, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// Certificate chain file.
    pub cert_file: PathBuf,
    /// Private key file.
    pub key_file: PathBuf,
}

/// Static file directory mounted under a URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMount {
    /// Directory files are served from.
    pub dir: PathBuf,
    /// URL prefix, starting with `/`.
    pub prefix: String,
}

/// Fixed-window rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub requests: u64,
    /// Window length.
    pub window: Duration,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host or IP address to bind.
    pub host: String,
    /// Port to bind; 0 lets the OS choose.
    pub port: u16,
    /// Time allowed to receive request headers.
    pub read_timeout: Duration,
    /// Time allowed for a pending response write.
    pub write_timeout: Duration,
    /// Keep-alive connections idle this long are closed.
    pub idle_timeout: Duration,
    /// Default bound for [`Server::shutdown`](crate::Server::shutdown).
    pub shutdown_timeout: Duration,
    /// Deadline attached to every request.
    pub request_timeout: Duration,
    /// Connection read buffer limit, which bounds header size.
    pub max_header_bytes: usize,
    /// Request body limit.
    pub max_body_bytes: usize,
    /// Feature toggles.
    pub features: Features,
    /// TLS material; plain HTTP when `None`.
    pub tls: Option<TlsPaths>,
    /// Static file mount.
    pub static_files: Option<StaticMount>,
    /// Rate limit; disabled when `None`.
    pub rate_limit: Option<RateLimit>,
    /// Interval of the background health loop.
    pub health_interval: Duration,
    /// When the health loop logs an unhealthy status.
    pub unhealthy_log_policy: UnhealthyLogPolicy,
    /// Whether the health endpoint runs checks or serves the last run.
    pub health_endpoint_mode: HealthEndpointMode,
    /// Checks that decide readiness.
    pub critical_checks: Vec<String>,
    /// Interval of the metrics collector.
    pub metrics_interval: Duration,
    /// Latency samples retained per endpoint.
    pub sample_capacity: usize,
    /// Deployment environment name.
    pub environment: String,
    /// Reuse well-formed incoming request ids.
    pub trust_request_id: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&HeronConfig::default())
    }
}

impl ServerConfig {
    /// Resolves a loaded configuration.
    #[must_use]
    pub fn from_config(config: &HeronConfig) -> Self {
        let server = &config.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            read_timeout: server.read_timeout(),
            write_timeout: server.write_timeout(),
            idle_timeout: server.idle_timeout(),
            shutdown_timeout: server.shutdown_timeout(),
            request_timeout: server.request_timeout(),
            max_header_bytes: server.max_header_bytes,
            max_body_bytes: server.max_body_bytes,
            features: Features {
                cors: config.features.enable_cors,
                compression: config.features.enable_compression,
                logging: config.features.enable_logging,
                metrics: config.features.enable_metrics,
                health: config.features.enable_health,
            },
            tls: config.tls.paths().map(|(cert, key)| TlsPaths {
                cert_file: cert.clone(),
                key_file: key.clone(),
            }),
            static_files: config.static_files.dir.as_ref().map(|dir| StaticMount {
                dir: dir.clone(),
                prefix: config.static_files.prefix.clone(),
            }),
            rate_limit: config.rate_limit.enabled.then(|| RateLimit {
                requests: config.rate_limit.requests,
                window: config.rate_limit.window(),
            }),
            health_interval: config.health.interval(),
            unhealthy_log_policy: if config.health.log_every_unhealthy_tick {
                UnhealthyLogPolicy::EveryTick
            } else {
                UnhealthyLogPolicy::OnTransition
            },
            health_endpoint_mode: config.health.endpoint_mode,
            critical_checks: config.health.critical_checks.clone(),
            metrics_interval: config.metrics.interval(),
            sample_capacity: config.metrics.sample_capacity,
            environment: server.environment.clone(),
            trust_request_id: server.trust_request_id,
        }
    }

    /// Returns the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        crate::error::describe_addr(&self.host, self.port)
    }

    /// Checks for values the server cannot start with.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Configuration`] naming the offending value.
    pub fn validate(&self) -> ServerResult<()> {
        if self.host.trim().is_empty() {
            return Err(ServerError::configuration("host must not be empty"));
        }
        for (name, value) in [
            ("read timeout", self.read_timeout),
            ("write timeout", self.write_timeout),
            ("idle timeout", self.idle_timeout),
            ("request timeout", self.request_timeout),
            ("health interval", self.health_interval),
            ("metrics interval", self.metrics_interval),
        ] {
            if value.is_zero() {
                return Err(ServerError::configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.max_header_bytes < MIN_HEADER_BYTES {
            return Err(ServerError::configuration(format!(
                "max header bytes must be at least {MIN_HEADER_BYTES}"
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(ServerError::configuration("max body bytes must be greater than zero"));
        }
        if self.sample_capacity == 0 {
            return Err(ServerError::configuration("sample capacity must be greater than zero"));
        }
        if let Some(limit) = self.rate_limit {
            if limit.requests == 0 || limit.window.is_zero() {
                return Err(ServerError::configuration(
                    "rate limit requests and window must be greater than zero",
                ));
            }
        }
        if let Some(mount) = &self.static_files {
            if !mount.prefix.starts_with('/') {
                return Err(ServerError::configuration("static prefix must start with '/'"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_file_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.unhealthy_log_policy, UnhealthyLogPolicy::EveryTick);
        assert_eq!(config.health_endpoint_mode, HealthEndpointMode::Fresh);
        assert!(config.rate_limit.is_none());
        assert!(config.tls.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_config() {
        let mut file = HeronConfig::default();
        file.server.host = "127.0.0.1".into();
        file.rate_limit.enabled = true;
        file.rate_limit.requests = 5;
        file.rate_limit.window_secs = 1;
        file.health.log_every_unhealthy_tick = false;
        file.static_files.dir = Some(PathBuf::from("./public"));
        file.features.enable_cors = false;

        let config = ServerConfig::from_config(&file);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(
            config.rate_limit,
            Some(RateLimit {
                requests: 5,
                window: Duration::from_secs(1)
            })
        );
        assert_eq!(config.unhealthy_log_policy, UnhealthyLogPolicy::OnTransition);
        assert_eq!(config.static_files.unwrap().prefix, "/static");
        assert!(!config.features.cors);
    }

    #[test]
    fn test_validation() {
        let config = ServerConfig {
            read_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServerError::Configuration(_))));

        let config = ServerConfig {
            max_header_bytes: 1024,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            rate_limit: Some(RateLimit {
                requests: 0,
                window: Duration::from_secs(1),
            }),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
