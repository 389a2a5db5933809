//! Observability for Heron services.
//!
//! - **Logging**: `tracing` events written by a `tracing-subscriber` sink,
//!   human-readable in development and JSON in production
//! - **Metrics**: an in-process [`MetricsRegistry`] with per-endpoint counters
//!   and a bounded latency history, mirrored to the `metrics` facade
//! - **Process sampling**: [`ProcessSampler`] implementations polled by the
//!   server's background collector
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `heron_http_requests_total` | Counter | `method`, `path`, `status` |
//! | `heron_http_request_duration_seconds` | Histogram | `method`, `path` |
//! | `heron_http_requests_active` | Gauge | - |
//!
//! Nothing is exported unless the host installs a `metrics` recorder; the
//! registry snapshot is always available.
//!
//! # Example
//!
//! ```rust,ignore
//! use heron_telemetry::{init_logging, LogConfig, MetricsRegistry};
//! use std::time::Duration;
//!
//! init_logging(&LogConfig::production())?;
//!
//! let metrics = MetricsRegistry::new(100);
//! metrics.record_request("GET", "/users/{id}", 200, Duration::from_millis(12));
//! println!("{}", serde_json::to_string(&metrics.snapshot())?);
//! ```

#![doc(html_root_url = "https://docs.rs/heron-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod registry;
pub mod sampler;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use registry::{ActiveRequest, EndpointSnapshot, MetricsRegistry, MetricsSnapshot};
pub use sampler::{ProcessSample, ProcessSampler, RuntimeSampler};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
