//! In-process request metrics.
//!
//! [`MetricsRegistry`] counts requests per endpoint and per status code and
//! keeps a bounded history of recent latencies for every endpoint. All of it
//! lives behind one lock that each completed request takes briefly.
//!
//! The mean latency in a snapshot is computed over the retained samples
//! only, so it describes recent traffic rather than the whole lifetime.

use crate::sampler::ProcessSample;
use heron_core::{SharedClock, SystemClock};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Once;
use std::time::{Duration, Instant};

/// Default number of latency samples kept per endpoint.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 100;

const REQUESTS_TOTAL: &str = "heron_http_requests_total";
const REQUEST_DURATION: &str = "heron_http_request_duration_seconds";
const REQUESTS_ACTIVE: &str = "heron_http_requests_active";

static DESCRIBE: Once = Once::new();

fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(REQUESTS_TOTAL, "Total number of completed HTTP requests");
        describe_histogram!(
            REQUEST_DURATION,
            metrics::Unit::Seconds,
            "HTTP request duration in seconds"
        );
        describe_gauge!(REQUESTS_ACTIVE, "Number of HTTP requests being processed");
    });
}

#[derive(Debug, Default)]
struct EndpointStats {
    count: u64,
    samples: VecDeque<Duration>,
}

#[derive(Debug, Default)]
struct State {
    total: u64,
    active: u64,
    status_codes: BTreeMap<u16, u64>,
    endpoints: BTreeMap<(String, String), EndpointStats>,
    process: Option<ProcessSample>,
}

/// Request counters and latency history.
///
/// # Example
///
/// ```
/// use heron_telemetry::MetricsRegistry;
/// use std::time::Duration;
///
/// let registry = MetricsRegistry::new(100);
/// registry.record_request("GET", "/ping", 200, Duration::from_millis(3));
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.total_requests, 1);
/// assert_eq!(snapshot.endpoints[0].count, 1);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    state: Mutex<State>,
    capacity: usize,
    clock: SharedClock,
    started_at: Instant,
}

impl MetricsRegistry {
    /// Creates a registry keeping `capacity` latency samples per endpoint.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, SystemClock::shared())
    }

    /// Creates a registry that measures uptime with `clock`.
    #[must_use]
    pub fn with_clock(capacity: usize, clock: SharedClock) -> Self {
        describe_metrics();
        Self {
            state: Mutex::new(State::default()),
            capacity: capacity.max(1),
            started_at: clock.now(),
            clock,
        }
    }

    /// Returns the per-endpoint sample capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks a request as in flight until the returned guard is dropped.
    #[must_use = "the request stops counting as active when the guard is dropped"]
    pub fn track_active(&self) -> ActiveRequest<'_> {
        self.state.lock().active += 1;
        gauge!(REQUESTS_ACTIVE).increment(1.0);
        ActiveRequest { registry: self }
    }

    /// Records a completed request.
    ///
    /// `path` should be the matched route pattern so that every concrete
    /// path of a route shares one entry.
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.total += 1;
            *state.status_codes.entry(status).or_insert(0) += 1;

            let stats = state
                .endpoints
                .entry((method.to_owned(), path.to_owned()))
                .or_default();
            stats.count += 1;
            if stats.samples.len() == self.capacity {
                stats.samples.pop_front();
            }
            stats.samples.push_back(duration);
        }

        counter!(
            REQUESTS_TOTAL,
            "method" => method.to_owned(),
            "path" => path.to_owned(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!(
            REQUEST_DURATION,
            "method" => method.to_owned(),
            "path" => path.to_owned()
        )
        .record(duration.as_secs_f64());
    }

    /// Stores the latest process sample.
    pub fn record_process_sample(&self, sample: ProcessSample) {
        self.state.lock().process = Some(sample);
    }

    /// Returns the time since the registry was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// Returns a point-in-time copy of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.uptime().as_secs_f64();
        let state = self.state.lock();

        let endpoints = state
            .endpoints
            .iter()
            .map(|((method, path), stats)| EndpointSnapshot {
                method: method.clone(),
                path: path.clone(),
                count: stats.count,
                avg_latency_ms: mean_millis(&stats.samples),
                samples: stats.samples.len(),
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds: uptime,
            total_requests: state.total,
            active_requests: state.active,
            requests_per_second: if uptime > 0.0 {
                state.total as f64 / uptime
            } else {
                0.0
            },
            status_codes: state.status_codes.clone(),
            endpoints,
            process: state.process.clone(),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

fn mean_millis(samples: &VecDeque<Duration>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: Duration = samples.iter().sum();
    total.as_secs_f64() * 1000.0 / samples.len() as f64
}

/// Guard returned by [`MetricsRegistry::track_active`].
#[derive(Debug)]
pub struct ActiveRequest<'a> {
    registry: &'a MetricsRegistry,
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        gauge!(REQUESTS_ACTIVE).decrement(1.0);
    }
}

/// Serializable view of the registry.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the registry was created.
    pub uptime_seconds: f64,
    /// Completed requests.
    pub total_requests: u64,
    /// Requests currently in flight.
    pub active_requests: u64,
    /// `total_requests / uptime_seconds`.
    pub requests_per_second: f64,
    /// Completed requests by status code.
    pub status_codes: BTreeMap<u16, u64>,
    /// Per-endpoint statistics, ordered by method then path.
    pub endpoints: Vec<EndpointSnapshot>,
    /// Latest process sample, if the collector has run.
    pub process: Option<ProcessSample>,
}

/// Statistics for one `(method, path)` pair.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    /// HTTP method.
    pub method: String,
    /// Route pattern, or a shared key for unmatched requests.
    pub path: String,
    /// Completed requests, including those whose samples were evicted.
    pub count: u64,
    /// Mean latency over the retained samples, in milliseconds.
    pub avg_latency_ms: f64,
    /// Number of retained samples.
    pub samples: usize,
}
