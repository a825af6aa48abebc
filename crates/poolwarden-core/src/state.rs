//! Controller state machine types

use serde::{Deserialize, Serialize};

/// Lifecycle of a `PoolControllerActor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// No configuration applied yet
    Unconfigured,
    /// Configured, reconciliation halted
    Stopped,
    /// Reconciling on a fixed period
    Started,
}

impl ControllerState {
    /// Check whether a transition to `next` is allowed
    #[must_use]
    pub fn can_transition_to(self, next: ControllerState) -> bool {
        matches!(
            (self, next),
            (
                ControllerState::Unconfigured | ControllerState::Stopped,
                ControllerState::Stopped
            ) | (ControllerState::Stopped, ControllerState::Started)
                | (ControllerState::Started, ControllerState::Stopped)
        )
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Unconfigured => write!(f, "unconfigured"),
            ControllerState::Stopped => write!(f, "stopped"),
            ControllerState::Started => write!(f, "started"),
        }
    }
}
