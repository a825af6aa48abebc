//! Core error types for poolwarden-core

use poolwarden_driver::{DriverError, StartMachinesError, TerminateMachinesError};
use poolwarden_fetch::{FetchError, StorageError};
use thiserror::Error;

use crate::state::ControllerState;

/// Errors raised while building a resize plan
///
/// These indicate programming errors and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Margin outside `[0, 3600)` seconds
    #[error("instance hour margin must be in [0, 3600) seconds, got {0}")]
    InvalidInstanceHourMargin(u64),

    /// Plan that both grows and shrinks the pool
    #[error(
        "ambiguous resize plan: {to_request} to request, {to_spare} to spare, {to_terminate} to terminate"
    )]
    AmbiguousPlan {
        to_request: usize,
        to_spare: usize,
        to_terminate: usize,
    },
}

/// Errors that can occur in pool controller operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Operation requires a configuration
    #[error("pool controller not configured")]
    NotConfigured,

    /// Operation requires a started controller
    #[error("pool controller not started")]
    NotStarted,

    /// Invalid or rejected configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid state transition attempted
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ControllerState,
        to: ControllerState,
    },

    /// Referenced machine is not part of the pool
    #[error("machine not found: {0}")]
    MachineNotFound(String),

    /// Desired size has neither been set nor learned from the pool
    #[error("desired size not yet known")]
    DesiredSizeUnknown,

    /// Pool snapshot unavailable
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Provider call failed
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Bulk start failed part-way
    #[error(transparent)]
    StartMachines(#[from] StartMachinesError),

    /// Bulk termination failed for some machines
    #[error(transparent)]
    TerminateMachines(#[from] TerminateMachinesError),

    /// Resize planning rejected its input
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Persisted state could not be read or written
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// Map a driver error for a specific machine, surfacing absence as `MachineNotFound`
    #[must_use]
    pub fn for_machine(id: &str, error: DriverError) -> Self {
        if error.is_not_found() {
            CoreError::MachineNotFound(id.to_string())
        } else {
            CoreError::Driver(error)
        }
    }
}
