//! Periodic health and metrics loops.
//!
//! Both loops are spawned on the coordinator's background tracker and stop
//! when its token is cancelled. A run in progress at that moment is
//! abandoned. The first tick is skipped so a loop never fires at startup.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use heron_telemetry::{MetricsRegistry, ProcessSampler};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::ServerError;
use crate::health::{HealthRegistry, HealthStatus, UnhealthyLogPolicy};

/// Spawns the loop that runs every health check each `period`.
pub(crate) fn spawn_health_loop(
    tracker: &TaskTracker,
    cancel: CancellationToken,
    registry: Arc<HealthRegistry>,
    period: Duration,
    policy: UnhealthyLogPolicy,
) {
    tracker.spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut previous: Option<bool> = None;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                status = registry.run_checks() => status,
            };

            let healthy = status.is_healthy();
            if policy.should_warn(previous, healthy) {
                log_unhealthy(&status);
            } else if healthy && previous == Some(false) {
                tracing::info!("health checks recovered");
            }
            previous = Some(healthy);
        }
        tracing::debug!("health loop stopped");
    });
}

fn log_unhealthy(status: &HealthStatus) {
    for (name, reason) in status.failures() {
        let err = ServerError::HealthCheckFailure {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        tracing::warn!(check = name, "{err}");
    }
}

/// Spawns the loop that samples the process each `period`.
pub(crate) fn spawn_metrics_loop(
    tracker: &TaskTracker,
    cancel: CancellationToken,
    registry: Arc<MetricsRegistry>,
    sampler: Arc<dyn ProcessSampler>,
    period: Duration,
) {
    tracker.spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match std::panic::catch_unwind(AssertUnwindSafe(|| sampler.sample())) {
                Ok(sample) => {
                    tracing::trace!(?sample, "process sample");
                    registry.record_process_sample(sample);
                }
                Err(_) => tracing::error!(?sampler, "process sampler panicked"),
            }
        }
        tracing::debug!("metrics loop stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_telemetry::ProcessSample;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingSampler(AtomicUsize);

    impl ProcessSampler for CountingSampler {
        fn sample(&self) -> ProcessSample {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            ProcessSample {
                alive_tasks: Some(n),
                ..ProcessSample::default()
            }
        }
    }

    #[derive(Debug)]
    struct PanickingSampler;

    impl ProcessSampler for PanickingSampler {
        fn sample(&self) -> ProcessSample {
            panic!("sampler bug")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_loop_skips_first_tick_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(HealthRegistry::new("1.0.0"));
        let probe_calls = Arc::clone(&calls);
        registry.register("database", move || {
            let calls = Arc::clone(&probe_calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }).unwrap();

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        spawn_health_loop(
            &tracker,
            cancel.clone(),
            Arc::clone(&registry),
            Duration::from_secs(30),
            UnhealthyLogPolicy::EveryTick,
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(registry.last_status().await.unwrap().is_healthy());

        cancel.cancel();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_loop_abandons_slow_run() {
        let registry = Arc::new(HealthRegistry::new("1.0.0"));
        registry.register("slow", || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }).unwrap();

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        spawn_health_loop(
            &tracker,
            cancel.clone(),
            registry,
            Duration::from_secs(1),
            UnhealthyLogPolicy::OnTransition,
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        tracker.close();
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("loop should stop promptly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_loop_records_samples() {
        let registry = Arc::new(MetricsRegistry::new(100));
        let sampler = Arc::new(CountingSampler::default());

        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        spawn_metrics_loop(
            &tracker,
            cancel.clone(),
            Arc::clone(&registry),
            sampler.clone(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(sampler.0.load(Ordering::SeqCst), 3);
        assert_eq!(
            registry.snapshot().process.and_then(|p| p.alive_tasks),
            Some(3)
        );

        cancel.cancel();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_loop_survives_sampler_panic() {
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        spawn_metrics_loop(
            &tracker,
            cancel.clone(),
            Arc::new(MetricsRegistry::new(100)),
            Arc::new(PanickingSampler),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(tracker.len(), 1, "loop is still running");

        cancel.cancel();
        tracker.close();
        tracker.wait().await;
    }
}
