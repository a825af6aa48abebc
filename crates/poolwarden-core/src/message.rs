//! Message types for actor communication
//!
//! Message handlers are implemented in `actor::controller`.

use chrono::{DateTime, Utc};
use kameo_macros::Reply;
use poolwarden_api::{MembershipStatus, ServiceState};
use serde::Serialize;

use crate::config::PoolConfig;
use crate::state::ControllerState;
use crate::termination::ScheduledTermination;

// ============================================================================
// Lifecycle
// ============================================================================

/// Validate and apply a pool configuration
#[derive(Debug)]
pub struct Configure {
    pub config: PoolConfig,
}

/// Get the configuration currently applied
#[derive(Debug)]
pub struct GetConfiguration;

/// Start periodic reconciliation
#[derive(Debug)]
pub struct Start;

/// Halt periodic reconciliation
#[derive(Debug)]
pub struct Stop;

/// Get controller status
#[derive(Debug)]
pub struct GetStatus;

/// Run one reconciliation cycle now
#[derive(Debug)]
pub struct Reconcile;

/// Controller status response
#[derive(Debug, Clone, Serialize, Reply)]
pub struct ControllerStatus {
    pub state: ControllerState,
    /// Name of the configured pool
    pub pool_name: Option<String>,
    pub desired_size: Option<usize>,
    /// Machines waiting in the termination queue
    pub scheduled_terminations: Vec<ScheduledTermination>,
    /// Completion time of the last reconciliation cycle
    pub last_reconciled: Option<DateTime<Utc>>,
    /// Failure summary of the last cycle, if it failed in whole or in part
    pub last_error: Option<String>,
}

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub desired_size: usize,
    /// Net size before acting
    pub net_size: usize,
    /// Machines started
    pub started: Vec<String>,
    /// Queued terminations cancelled
    pub spared: Vec<String>,
    /// Terminations added to the queue
    pub scheduled: Vec<String>,
    /// Machines terminated
    pub terminated: Vec<String>,
    /// Partial failures, one message each
    pub failures: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn new(desired_size: usize, net_size: usize) -> Self {
        Self {
            desired_size,
            net_size,
            ..Self::default()
        }
    }

    /// Whether any step of the cycle failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

// ============================================================================
// Pool management
// ============================================================================

/// Get the current pool snapshot
#[derive(Debug)]
pub struct GetMachinePool;

/// Get desired, allocated and effective sizes
#[derive(Debug)]
pub struct GetPoolSize;

/// Set the size the pool converges to
#[derive(Debug)]
pub struct SetDesiredSize {
    pub desired_size: usize,
}

/// Terminate a pool member immediately
#[derive(Debug)]
pub struct TerminateMachine {
    pub machine_id: String,
    /// Lower the desired size by one so no replacement is started
    pub decrement_desired: bool,
}

/// Add an existing machine to the pool
#[derive(Debug)]
pub struct AttachMachine {
    pub machine_id: String,
}

/// Remove a machine from the pool without terminating it
#[derive(Debug)]
pub struct DetachMachine {
    pub machine_id: String,
    /// Lower the desired size by one so no replacement is started
    pub decrement_desired: bool,
}

/// Report the service state of a pool member
#[derive(Debug)]
pub struct SetServiceState {
    pub machine_id: String,
    pub service_state: ServiceState,
}

/// Change the membership status of a pool member
#[derive(Debug)]
pub struct SetMembershipStatus {
    pub machine_id: String,
    pub membership_status: MembershipStatus,
}
