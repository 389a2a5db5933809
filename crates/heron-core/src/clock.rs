//! Injectable time source.
//!
//! Components that reason about windows, uptime or timestamps take a
//! [`SharedClock`] instead of reading the system time directly. Tests use
//! [`ManualClock`] to move time forward deterministically.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time.
    fn system_now(&self) -> SystemTime;
}

/// A clock shared between components.
pub type SharedClock = Arc<dyn Clock>;

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Returns the system clock as a [`SharedClock`].
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// # Example
///
/// ```
/// use heron_core::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - start, Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    instant_origin: Instant,
    system_origin: SystemTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instant_origin: Instant::now(),
            system_origin: SystemTime::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.instant_origin + *self.offset.lock()
    }

    fn system_now(&self) -> SystemTime {
        self.system_origin + *self.offset.lock()
    }
}
