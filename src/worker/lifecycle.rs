//! Worker version lifecycle.
//!
//! ```text
//! Registering -> Installing -> Installed -> Activating -> Active
//!                     |            |             |          |
//!                     +------------+-------------+----------+--> Redundant
//! ```

use std::fmt;
use std::sync::RwLock;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::cache::{rw_read, rw_write};

const SOURCE: &str = "worker::lifecycle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Registering,
    Installing,
    /// Installed and waiting to take over.
    Installed,
    Activating,
    Active,
    /// Failed to install, or superseded by a newer version.
    Redundant,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registering => "registering",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        }
    }

    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, next),
            (Registering, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Active)
                | (Installing | Installed | Activating | Active, Redundant)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal worker transition from `{from}` to `{to}`")]
pub struct LifecycleError {
    pub from: WorkerState,
    pub to: WorkerState,
}

/// State holder for one worker version.
#[derive(Debug)]
pub struct Lifecycle {
    state: RwLock<WorkerState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(WorkerState::Registering),
        }
    }

    pub fn state(&self) -> WorkerState {
        *rw_read(&self.state, SOURCE, "state")
    }

    /// Move to `next`, returning the previous state.
    pub fn advance(&self, next: WorkerState) -> Result<WorkerState, LifecycleError> {
        let mut state = rw_write(&self.state, SOURCE, "advance");
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(LifecycleError { from, to: next });
        }
        *state = next;
        debug!(from = %from, to = %next, "Worker state changed");
        Ok(from)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
