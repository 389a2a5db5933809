//! Server lifecycle state machine.
//!
//! ```text
//! Created → Configured → Listening → ShuttingDown → Stopped
//! ```
//!
//! Routes, middleware and health checks can only be registered before the
//! server starts listening. Every transition is checked; an operation that
//! is not valid in the current state fails with
//! [`LifecycleError::InvalidState`]. Registering through a frozen registry
//! handle fails with [`LifecycleError::Frozen`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// Builder created, configuration not yet validated.
    Created = 0,
    /// Configuration validated, accepting registrations.
    Configured = 1,
    /// Listening socket bound and serving.
    Listening = 2,
    /// Shutdown in progress.
    ShuttingDown = 3,
    /// Fully stopped.
    Stopped = 4,
}

impl LifecycleState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Configured,
            2 => Self::Listening,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }

    /// Returns true while routes and checks may still be registered.
    #[must_use]
    pub const fn accepts_registration(self) -> bool {
        matches!(self, Self::Created | Self::Configured)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Configured)
                | (Self::Configured, Self::Listening)
                | (Self::Configured | Self::Listening, Self::ShuttingDown)
                | (Self::Listening | Self::ShuttingDown, Self::Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for operations attempted in the wrong lifecycle state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The operation is not valid in the current state.
    #[error("cannot {operation} while server is {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the server was in.
        state: LifecycleState,
    },

    /// A registry was changed after the server started.
    #[error("cannot change the {registry} registry after the server has started")]
    Frozen {
        /// The registry that was frozen.
        registry: &'static str,
    },
}

/// Atomic holder for a [`LifecycleState`].
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    /// Creates a cell in `initial` state.
    #[must_use]
    pub const fn new(initial: LifecycleState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves from `from` to `to`.
    ///
    /// Fails if the current state is not `from` or the transition is not
    /// allowed. Exactly one of several racing callers succeeds.
    pub fn transition(
        &self,
        operation: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidState {
                operation,
                state: self.get(),
            });
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| LifecycleError::InvalidState {
                operation,
                state: LifecycleState::from_u8(actual),
            })
    }

    /// Fails unless registrations are still accepted.
    pub fn ensure_registration(&self, operation: &'static str) -> Result<(), LifecycleError> {
        let state = self.get();
        if state.accepts_registration() {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState { operation, state })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let cell = StateCell::new(LifecycleState::Created);
        cell.transition("configure", LifecycleState::Created, LifecycleState::Configured)
            .unwrap();
        cell.transition("start", LifecycleState::Configured, LifecycleState::Listening)
            .unwrap();
        cell.transition("shutdown", LifecycleState::Listening, LifecycleState::ShuttingDown)
            .unwrap();
        cell.transition("stop", LifecycleState::ShuttingDown, LifecycleState::Stopped)
            .unwrap();
        assert_eq!(cell.get(), LifecycleState::Stopped);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let cell = StateCell::new(LifecycleState::Configured);
        cell.transition("start", LifecycleState::Configured, LifecycleState::Listening)
            .unwrap();

        let err = cell
            .transition("start", LifecycleState::Configured, LifecycleState::Listening)
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidState {
                operation: "start",
                state: LifecycleState::Listening
            }
        );
    }

    #[test]
    fn test_disallowed_transition() {
        let cell = StateCell::new(LifecycleState::Created);
        assert!(cell
            .transition("start", LifecycleState::Created, LifecycleState::Listening)
            .is_err());
        assert_eq!(cell.get(), LifecycleState::Created);
    }

    #[test]
    fn test_registration_window() {
        let cell = StateCell::new(LifecycleState::Configured);
        assert!(cell.ensure_registration("route").is_ok());

        cell.transition("start", LifecycleState::Configured, LifecycleState::Listening)
            .unwrap();
        let err = cell.ensure_registration("route").unwrap_err();
        assert_eq!(err.to_string(), "cannot route while server is listening");
    }
}
