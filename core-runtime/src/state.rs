//! Worker lifecycle state.
//!
//! ```text
//! Idle ──start()──▶ Starting ──loop running──▶ Running
//!                      │                          │
//!                      └──────request_stop()──────┤
//!                                                 ▼
//!                      Stopped ◀──thread exit── Stopping
//! ```
//!
//! Transitions only ever move forward. A stopped worker stays stopped.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    /// Whether the submission gate still forwards work to the loop.
    pub fn accepts_work(self) -> bool {
        matches!(self, Self::Idle | Self::Starting | Self::Running)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared state cell with change notification.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Idle),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the previous state on success and the current state otherwise.
    pub(crate) fn advance(
        &self,
        from: &[WorkerState],
        to: WorkerState,
    ) -> std::result::Result<WorkerState, WorkerState> {
        let mut state = self.state.lock();
        let current = *state;
        if !from.contains(&current) || to < current {
            return Err(current);
        }
        *state = to;
        drop(state);
        self.changed.notify_all();
        Ok(current)
    }

    /// Block until the state reaches at least `target`.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub(crate) fn wait_for(&self, target: WorkerState, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while *state < target {
            match deadline {
                None => self.changed.wait(&mut state),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    self.changed.wait_for(&mut state, remaining);
                }
            }
        }
        true
    }
}
