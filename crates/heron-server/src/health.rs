//! Health checks, readiness and liveness.
//!
//! A [`HealthRegistry`] holds named probes and the last aggregated
//! [`HealthStatus`]. A run executes every probe one after another, so a
//! slow probe delays the whole run, and replaces the snapshot while holding
//! its write lock for the full run. Readers never see a half-built status.
//!
//! - **Health**: every probe, overall healthy only if all of them are
//! - **Readiness**: only the critical probes, and never while shutting down
//! - **Liveness**: no probes at all; answering is proof enough
//!
//! # Example
//!
//! ```rust
//! use heron_server::HealthRegistry;
//!
//! # tokio_test::block_on(async {
//! let registry = HealthRegistry::new(env!("CARGO_PKG_VERSION"));
//! registry.register("database", || async { Ok(()) }).unwrap();
//! registry.register("cache", || async { Err("connection refused".to_string()) }).unwrap();
//!
//! let status = registry.run_checks().await;
//! assert!(!status.is_healthy());
//! assert_eq!(status.checks["cache"].error.as_deref(), Some("connection refused"));
//! # });
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use heron_core::{SharedClock, SystemClock};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleError;

/// Checks that decide readiness unless configured otherwise.
pub const DEFAULT_CRITICAL_CHECKS: [&str; 3] = ["database", "cache", "storage"];

/// A named dependency probe.
///
/// Implemented for any `Fn() -> impl Future<Output = Result<(), String>>`.
/// The registry measures latency; the probe only reports success or the
/// reason for failure.
pub trait HealthProbe: Send + Sync + 'static {
    /// Runs the probe once.
    fn check(&self) -> BoxFuture<'_, Result<(), String>>;
}

impl<F, Fut> HealthProbe for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn check(&self) -> BoxFuture<'_, Result<(), String>> {
        Box::pin(self())
    }
}

/// Aggregate health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every check passed.
    Healthy,
    /// At least one check failed.
    Unhealthy,
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Failure reported by the probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time the probe took, in milliseconds.
    pub latency_ms: f64,
}

/// Aggregated result of a check run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: OverallStatus,
    /// Per-check results by name.
    pub checks: BTreeMap<String, CheckResult>,
    /// When the run finished, RFC 3339.
    pub timestamp: String,
    /// Seconds since the registry was created.
    pub uptime_seconds: u64,
    /// Service version.
    pub version: String,
}

impl HealthStatus {
    /// Returns true if every check passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == OverallStatus::Healthy
    }

    /// Returns the failing checks and their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.checks.iter().filter(|(_, r)| !r.healthy).map(|(name, r)| {
            (name.as_str(), r.error.as_deref().unwrap_or("unhealthy"))
        })
    }
}

/// Result of a readiness evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    /// Whether the server should receive traffic.
    pub ready: bool,
    /// Critical checks that were evaluated.
    pub checks: BTreeMap<String, bool>,
}

/// When the background loop logs an unhealthy status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhealthyLogPolicy {
    /// Warn on every tick that finds the server unhealthy.
    #[default]
    EveryTick,
    /// Warn only when the status turns unhealthy.
    OnTransition,
}

impl UnhealthyLogPolicy {
    /// Returns true if an unhealthy result should be logged, given whether
    /// the previous run was healthy.
    #[must_use]
    pub fn should_warn(self, previous: Option<bool>, healthy: bool) -> bool {
        if healthy {
            return false;
        }
        match self {
            Self::EveryTick => true,
            Self::OnTransition => previous != Some(false),
        }
    }
}

type SharedProbe = Arc<dyn HealthProbe>;

/// Named probes plus the last aggregated status.
pub struct HealthRegistry {
    probes: RwLock<Vec<(String, SharedProbe)>>,
    snapshot: tokio::sync::RwLock<Option<HealthStatus>>,
    critical: Vec<String>,
    version: String,
    clock: SharedClock,
    started_at: Instant,
    accepting: AtomicBool,
    frozen: AtomicBool,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("checks", &self.check_names())
            .field("critical", &self.critical)
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

impl HealthRegistry {
    /// Creates an empty registry reporting `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_clock(version, SystemClock::shared())
    }

    /// Creates an empty registry timed by `clock`.
    #[must_use]
    pub fn with_clock(version: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            probes: RwLock::new(Vec::new()),
            snapshot: tokio::sync::RwLock::new(None),
            critical: DEFAULT_CRITICAL_CHECKS.iter().map(ToString::to_string).collect(),
            version: version.into(),
            started_at: clock.now(),
            clock,
            accepting: AtomicBool::new(true),
            frozen: AtomicBool::new(false),
        }
    }

    /// Replaces the names of the checks that decide readiness.
    #[must_use]
    pub fn with_critical_checks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical = names.into_iter().map(Into::into).collect();
        self
    }

    /// Registers a probe. A probe with the same name is replaced.
    ///
    /// Fails with [`LifecycleError::Frozen`] once the owning server has
    /// started.
    pub fn register(
        &self,
        name: impl Into<String>,
        probe: impl HealthProbe,
    ) -> Result<(), LifecycleError> {
        let name = name.into();
        let probe: SharedProbe = Arc::new(probe);
        let mut probes = self.probes.write();
        if self.is_frozen() {
            return Err(LifecycleError::Frozen { registry: "health" });
        }
        match probes.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = probe,
            None => probes.push((name, probe)),
        }
        Ok(())
    }

    /// Rejects further registrations.
    pub(crate) fn freeze(&self) {
        let _probes = self.probes.write();
        self.frozen.store(true, Ordering::SeqCst);
    }

    /// Returns true once registrations are rejected.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Returns the registered check names in registration order.
    #[must_use]
    pub fn check_names(&self) -> Vec<String> {
        self.probes.read().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Returns the critical check names.
    #[must_use]
    pub fn critical_checks(&self) -> &[String] {
        &self.critical
    }

    /// Returns the time since the registry was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// Runs every probe and replaces the shared snapshot.
    pub async fn run_checks(&self) -> HealthStatus {
        let mut snapshot = self.snapshot.write().await;
        let probes = self.probes.read().clone();

        let mut checks = BTreeMap::new();
        for (name, probe) in probes {
            let result = self.run_probe(&name, probe.as_ref()).await;
            checks.insert(name, result);
        }

        let status = HealthStatus {
            status: if checks.values().all(|r| r.healthy) {
                OverallStatus::Healthy
            } else {
                OverallStatus::Unhealthy
            },
            checks,
            timestamp: chrono::DateTime::<chrono::Utc>::from(self.clock.system_now()).to_rfc3339(),
            uptime_seconds: self.uptime().as_secs(),
            version: self.version.clone(),
        };
        *snapshot = Some(status.clone());
        status
    }

    /// Returns the status of the last run, if any.
    pub async fn last_status(&self) -> Option<HealthStatus> {
        self.snapshot.read().await.clone()
    }

    /// Returns the last status, running the checks if none exists yet.
    pub async fn cached_status(&self) -> HealthStatus {
        match self.last_status().await {
            Some(status) => status,
            None => self.run_checks().await,
        }
    }

    /// Evaluates the critical checks without touching the snapshot.
    ///
    /// Critical names with no registered probe are skipped. While the
    /// server is shutting down the result is always not ready.
    pub async fn readiness(&self) -> Readiness {
        if !self.is_accepting() {
            return Readiness {
                ready: false,
                checks: BTreeMap::new(),
            };
        }

        let critical: Vec<(String, SharedProbe)> = self
            .probes
            .read()
            .iter()
            .filter(|(name, _)| self.critical.contains(name))
            .cloned()
            .collect();

        let mut checks = BTreeMap::new();
        for (name, probe) in critical {
            let healthy = self.run_probe(&name, probe.as_ref()).await.healthy;
            checks.insert(name, healthy);
        }

        Readiness {
            ready: checks.values().all(|healthy| *healthy),
            checks,
        }
    }

    /// Sets whether the server is accepting traffic.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Returns false once shutdown has begun.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    async fn run_probe(&self, name: &str, probe: &dyn HealthProbe) -> CheckResult {
        let started = self.clock.now();
        let outcome = AssertUnwindSafe(probe.check()).catch_unwind().await;
        let latency = self.clock.now().saturating_duration_since(started);

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => {
                tracing::error!(check = %name, "health probe panicked");
                Some("probe panicked".to_string())
            }
        };

        CheckResult {
            healthy: error.is_none(),
            error,
            latency_ms: latency.as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_core::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> impl HealthProbe {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let registry = HealthRegistry::new("1.0.0");
        registry.register("database", || async { Ok(()) }).unwrap();
        registry.register("cache", || async { Ok(()) }).unwrap();

        let status = registry.run_checks().await;
        assert!(status.is_healthy());
        assert_eq!(status.checks.len(), 2);
        assert_eq!(status.version, "1.0.0");
        assert!(chrono::DateTime::parse_from_rfc3339(&status.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_one_failure_makes_overall_unhealthy() {
        let registry = HealthRegistry::new("1.0.0");
        registry.register("database", || async { Ok(()) }).unwrap();
        registry.register("storage", || async { Err("disk full".to_string()) }).unwrap();

        let status = registry.run_checks().await;
        assert_eq!(status.status, OverallStatus::Unhealthy);
        assert_eq!(status.failures().collect::<Vec<_>>(), vec![("storage", "disk full")]);
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new("1.0.0");
        assert!(registry.run_checks().await.is_healthy());
    }

    #[tokio::test]
    async fn test_snapshot_is_replaced_by_each_run() {
        let registry = HealthRegistry::new("1.0.0");
        assert!(registry.last_status().await.is_none());

        registry.register("cache", || async { Err("down".to_string()) }).unwrap();
        registry.run_checks().await;
        assert!(!registry.last_status().await.unwrap().is_healthy());

        registry.register("cache", || async { Ok(()) }).unwrap();
        registry.run_checks().await;
        let status = registry.last_status().await.unwrap();
        assert!(status.is_healthy());
        assert_eq!(status.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_status_runs_once_when_empty() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HealthRegistry::new("1.0.0");
        registry.register("database", counting(&calls)).unwrap();

        registry.cached_status().await;
        registry.cached_status().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_readiness_uses_critical_subset_only() {
        let critical_calls = Arc::new(AtomicUsize::new(0));
        let other_calls = Arc::new(AtomicUsize::new(0));
        let registry = HealthRegistry::new("1.0.0");
        registry.register("database", counting(&critical_calls)).unwrap();
        registry.register("search", counting(&other_calls)).unwrap();
        registry.register("queue", || async { Err("unreachable".to_string()) }).unwrap();

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert_eq!(readiness.checks.keys().collect::<Vec<_>>(), vec!["database"]);
        assert_eq!(critical_calls.load(Ordering::SeqCst), 1);
        assert_eq!(other_calls.load(Ordering::SeqCst), 0);
        assert!(registry.last_status().await.is_none());
    }

    #[tokio::test]
    async fn test_readiness_fails_with_critical_failure() {
        let registry = HealthRegistry::new("1.0.0").with_critical_checks(["queue"]);
        registry.register("queue", || async { Err("unreachable".to_string()) }).unwrap();

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.checks.get("queue"), Some(&false));
    }

    #[tokio::test]
    async fn test_not_ready_while_shutting_down() {
        let registry = HealthRegistry::new("1.0.0");
        registry.register("database", || async { Ok(()) }).unwrap();
        registry.set_accepting(false);
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_panicking_probe_is_unhealthy() {
        let registry = HealthRegistry::new("1.0.0");
        registry.register("flaky", || async {
            if true {
                panic!("probe bug");
            }
            Ok(())
        }).unwrap();

        let status = registry.run_checks().await;
        assert_eq!(
            status.checks["flaky"].error.as_deref(),
            Some("probe panicked")
        );
    }

    #[tokio::test]
    async fn test_frozen_registry_rejects_registration() {
        let registry = HealthRegistry::new("1.0.0");
        registry.register("database", || async { Ok(()) }).unwrap();
        registry.freeze();

        let err = registry
            .register("database", || async { Err("replaced".to_string()) })
            .unwrap_err();
        assert_eq!(err, LifecycleError::Frozen { registry: "health" });
        assert!(registry.register("cache", || async { Ok(()) }).is_err());

        assert_eq!(registry.check_names(), vec!["database"]);
        assert!(registry.run_checks().await.is_healthy());
    }

    #[tokio::test]
    async fn test_uptime_uses_clock() {
        let clock = Arc::new(ManualClock::new());
        let registry = HealthRegistry::with_clock("1.0.0", clock.clone());
        clock.advance(Duration::from_secs(90));
        assert_eq!(registry.run_checks().await.uptime_seconds, 90);
    }

    #[test]
    fn test_log_policy() {
        let every = UnhealthyLogPolicy::EveryTick;
        assert!(every.should_warn(None, false));
        assert!(every.should_warn(Some(false), false));
        assert!(!every.should_warn(Some(false), true));

        let edge = UnhealthyLogPolicy::OnTransition;
        assert!(edge.should_warn(None, false));
        assert!(edge.should_warn(Some(true), false));
        assert!(!edge.should_warn(Some(false), false));
    }

    #[test]
    fn test_status_serialization() {
        let status = HealthStatus {
            status: OverallStatus::Unhealthy,
            checks: BTreeMap::from([(
                "cache".to_string(),
                CheckResult {
                    healthy: false,
                    error: Some("down".into()),
                    latency_ms: 1.5,
                },
            )]),
            timestamp: "2026-01-01T00:00:00+00:00".into(),
            uptime_seconds: 3,
            version: "1.0.0".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["checks"]["cache"]["error"], "down");
    }
}
