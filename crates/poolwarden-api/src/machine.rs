//! Machine model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-reported lifecycle state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    /// Asked for, not yet acknowledged by the provider
    Requested,
    /// Acknowledged, booting
    Pending,
    Running,
    Terminating,
    Terminated,
}

impl MachineState {
    /// Whether a machine in this state holds (or will hold) capacity
    #[must_use]
    pub fn is_allocated(self) -> bool {
        matches!(
            self,
            MachineState::Requested | MachineState::Pending | MachineState::Running
        )
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineState::Requested => write!(f, "REQUESTED"),
            MachineState::Pending => write!(f, "PENDING"),
            MachineState::Running => write!(f, "RUNNING"),
            MachineState::Terminating => write!(f, "TERMINATING"),
            MachineState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Operational state of the service running on a machine
///
/// Reported externally (health checks, operators); machines start out
/// as `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Booting,
    InService,
    OutOfService,
    #[default]
    Unknown,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Booting => write!(f, "BOOTING"),
            ServiceState::InService => write!(f, "IN_SERVICE"),
            ServiceState::OutOfService => write!(f, "OUT_OF_SERVICE"),
            ServiceState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Pool membership flags of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipStatus {
    /// Counted towards the effective pool size
    pub active: bool,
    /// May be selected for automatic termination
    pub evictable: bool,
}

impl MembershipStatus {
    /// Create a membership status
    #[must_use]
    pub fn new(active: bool, evictable: bool) -> Self {
        Self { active, evictable }
    }

    /// Active but never automatically terminated
    #[must_use]
    pub fn protected() -> Self {
        Self::new(true, false)
    }

    /// Excluded from the pool size, so never chosen as a scale-in victim
    #[must_use]
    pub fn inactive() -> Self {
        Self::new(false, true)
    }
}

impl Default for MembershipStatus {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// A machine as seen in a pool snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Provider-assigned identifier
    pub id: String,
    /// Lifecycle state
    pub machine_state: MachineState,
    /// Service state
    #[serde(default)]
    pub service_state: ServiceState,
    /// Membership flags
    #[serde(default)]
    pub membership_status: MembershipStatus,
    /// Launch time, absent until the provider has launched the machine
    pub launch_time: Option<DateTime<Utc>>,
    /// Provider-specific metadata
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Machine {
    /// Create a machine with default service state and membership
    pub fn new(id: impl Into<String>, machine_state: MachineState) -> Self {
        Self {
            id: id.into(),
            machine_state,
            service_state: ServiceState::default(),
            membership_status: MembershipStatus::default(),
            launch_time: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set launch time
    #[must_use]
    pub fn with_launch_time(mut self, launch_time: DateTime<Utc>) -> Self {
        self.launch_time = Some(launch_time);
        self
    }

    /// Set service state
    #[must_use]
    pub fn with_service_state(mut self, service_state: ServiceState) -> Self {
        self.service_state = service_state;
        self
    }

    /// Set membership status
    #[must_use]
    pub fn with_membership_status(mut self, membership_status: MembershipStatus) -> Self {
        self.membership_status = membership_status;
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// In a non-terminal machine state
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.machine_state.is_allocated()
    }

    #[must_use]
    pub fn is_out_of_service(&self) -> bool {
        self.service_state == ServiceState::OutOfService
    }

    /// Counted by all sizing math: allocated, not out-of-service and active
    #[must_use]
    pub fn is_effective_member(&self) -> bool {
        self.is_allocated() && !self.is_out_of_service() && self.membership_status.active
    }

    #[must_use]
    pub fn is_evictable(&self) -> bool {
        self.membership_status.evictable
    }
}
