//! Typed configuration for Heron servers.
//!
//! Configuration is layered: built-in defaults, then an optional JSON or
//! TOML file, then a `.env` file, then environment variables. Every layer is
//! optional and later layers win.
//!
//! The root type is [`HeronConfig`]:
//!
//! - [`ServerSection`] - listen address, timeouts and request limits
//! - [`FeaturesSection`] - toggles for the built-in middleware and endpoints
//! - [`TlsSection`] - certificate and key paths
//! - [`HealthSection`] / [`MetricsSection`] - background loop intervals
//! - [`LoggingSection`] - log level and output format
//!
//! # Example
//!
//! ```no_run
//! use heron_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
//!
//! # fn main() -> Result<(), heron_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("heron.json")?
//!     .with_env_prefix(DEFAULT_ENV_PREFIX)
//!     .load()?;
//!
//! println!("listening on {}", config.server.addr());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```json
//! {
//!   "server": {
//!     "host": "0.0.0.0",
//!     "port": 8080,
//!     "read_timeout_secs": 15,
//!     "shutdown_timeout_secs": 30
//!   },
//!   "features": { "enable_cors": true, "enable_compression": false },
//!   "rate_limit": { "enabled": true, "requests": 100, "window_secs": 60 },
//!   "health": { "interval_secs": 30, "endpoint_mode": "fresh" },
//!   "logging": { "level": "info", "format": "json" }
//! }
//! ```
//!
//! Unknown fields are rejected.
//!
//! # Environment Variable Overrides
//!
//! - `HERON__SERVER__PORT=9000`
//! - `HERON__HEALTH__ENDPOINT_MODE=cached`
//! - `HERON_PORT=9000` (short alias)

#![doc(html_root_url = "https://docs.rs/heron-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    FeaturesSection, HealthEndpointMode, HealthSection, HeronConfig, LogFormat, LoggingSection,
    MetricsSection, RateLimitSection, ServerSection, StaticFilesSection, TlsSection,
    MIN_HEADER_BYTES,
};
