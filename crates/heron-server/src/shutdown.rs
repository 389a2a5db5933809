//! Graceful shutdown.
//!
//! Shutdown happens in phases, each driven by its own token:
//!
//! 1. **background**: the health and metrics loops stop, abandoning any run
//!    in progress
//! 2. **drain**: the accept loop stops and every connection finishes its
//!    current request, then closes
//! 3. **force**: when the timeout elapses, request cancellation tokens fire;
//!    connections still open shortly after that are dropped
//!
//! # Example
//!
//! ```rust
//! use heron_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let observer = shutdown.clone();
//!
//! shutdown.trigger();
//! shutdown.trigger();
//! assert!(observer.is_shutdown());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tokio_util::task::TaskTracker;

use crate::error::{ServerError, ServerResult};

/// Time given to cancelled requests, then again to dropped connections.
const FORCE_GRACE: Duration = Duration::from_millis(25);

/// A cloneable, one-shot shutdown signal.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the signal. Later calls do nothing.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns true once triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the signal is triggered, immediately if it already was.
    pub fn recv(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }
}

/// Waits for SIGINT or SIGTERM, or Ctrl+C where those do not exist.
///
/// Returns the name of the signal received.
pub async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => Ok("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}

/// Outcome of a completed shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections open when draining began.
    pub connections_at_start: usize,
    /// Time the shutdown took.
    pub elapsed: Duration,
    /// True if another call had already shut the server down.
    pub already_stopped: bool,
}

/// Tokens and trackers shared by the accept loop, the connections and the
/// background loops.
#[derive(Debug, Default)]
pub(crate) struct ShutdownCoordinator {
    started: AtomicBool,
    drain: ShutdownSignal,
    force: ShutdownSignal,
    requests: CancellationToken,
    background: CancellationToken,
    background_tasks: TaskTracker,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parent of every request's cancellation token.
    pub(crate) fn request_root(&self) -> &CancellationToken {
        &self.requests
    }

    pub(crate) fn drain_signal(&self) -> &ShutdownSignal {
        &self.drain
    }

    pub(crate) fn force_signal(&self) -> &ShutdownSignal {
        &self.force
    }

    pub(crate) fn background_token(&self) -> CancellationToken {
        self.background.clone()
    }

    pub(crate) fn background_tasks(&self) -> &TaskTracker {
        &self.background_tasks
    }

    pub(crate) fn connections(&self) -> &TaskTracker {
        &self.connections
    }

    /// Claims the right to shut down. Only the first caller gets `true`.
    pub(crate) fn begin(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs the background, drain and force phases within `timeout`.
    pub(crate) async fn run(&self, timeout: Duration) -> ServerResult<ShutdownReport> {
        let started = Instant::now();
        let deadline = started + timeout;

        self.background.cancel();
        self.background_tasks.close();
        if tokio::time::timeout_at(deadline, self.background_tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!("background tasks did not stop before the shutdown deadline");
        }

        let connections_at_start = self.connections.len();
        tracing::info!(
            connections = connections_at_start,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining connections"
        );
        self.drain.trigger();
        self.connections.close();

        if tokio::time::timeout_at(deadline, self.connections.wait())
            .await
            .is_ok()
        {
            return Ok(ShutdownReport {
                connections_at_start,
                elapsed: started.elapsed(),
                already_stopped: false,
            });
        }

        let remaining = self.connections.len();
        self.requests.cancel();
        if tokio::time::timeout(FORCE_GRACE, self.connections.wait())
            .await
            .is_err()
        {
            self.force.trigger();
            let _ = tokio::time::timeout(FORCE_GRACE, self.connections.wait()).await;
        }

        let err = ServerError::ShutdownTimeoutExceeded { remaining };
        tracing::warn!(remaining, "{err}");
        Err(err)
    }
}
