//! The ten lifecycle states shared by definitions and the runtime

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A state name did not match any lifecycle state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown lifecycle state '{0}'")]
pub struct UnknownStateError(pub String);

/// Lifecycle state of a managed object
///
/// Forward progress follows the declaration order from `Creating` through
/// `Destroyed`. `Failed` and `Unknown` are absorbing: only a destroy leaves
/// them. A freshly registered entry starts out `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Creating,
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Destroying,
    Destroyed,
    Failed,
    Unknown,
}

impl LifecycleState {
    /// All states in declaration order
    pub const ALL: [LifecycleState; 10] = [
        LifecycleState::Creating,
        LifecycleState::Created,
        LifecycleState::Starting,
        LifecycleState::Started,
        LifecycleState::Stopping,
        LifecycleState::Stopped,
        LifecycleState::Destroying,
        LifecycleState::Destroyed,
        LifecycleState::Failed,
        LifecycleState::Unknown,
    ];

    /// Display name, as used in `callState`/`initState` attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Creating => "Creating",
            LifecycleState::Created => "Created",
            LifecycleState::Starting => "Starting",
            LifecycleState::Started => "Started",
            LifecycleState::Stopping => "Stopping",
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Destroying => "Destroying",
            LifecycleState::Destroyed => "Destroyed",
            LifecycleState::Failed => "Failed",
            LifecycleState::Unknown => "Unknown",
        }
    }

    /// Whether the state is one of the two absorbing states
    pub fn is_absorbing(&self) -> bool {
        matches!(self, LifecycleState::Failed | LifecycleState::Unknown)
    }

    /// Whether an object exists for this state (created and not yet destroyed)
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            LifecycleState::Creating
                | LifecycleState::Created
                | LifecycleState::Starting
                | LifecycleState::Started
                | LifecycleState::Stopping
                | LifecycleState::Stopped
        )
    }

    /// Whether the state has reached `Created` without being torn down
    pub fn is_created(&self) -> bool {
        self.is_live() && *self != LifecycleState::Creating
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Destroyed
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStateError(s.to_string()))
    }
}
