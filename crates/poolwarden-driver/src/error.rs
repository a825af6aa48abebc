//! Error types for poolwarden-driver

use std::collections::BTreeMap;
use std::time::Duration;

use poolwarden_api::Machine;
use thiserror::Error;

/// Errors reported by a provider driver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// Driver used before `configure`
    #[error("driver not configured")]
    NotConfigured,

    /// Invalid driver settings
    #[error("invalid driver configuration: {0}")]
    ConfigError(String),

    /// Referenced machine does not belong to the pool
    #[error("machine not found: {0}")]
    MachineNotFound(String),

    /// Provider call timed out
    #[error("provider request timed out after {timeout:?}")]
    Timeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// Provider throttled the request
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),

    /// Provider API temporarily unavailable
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Account or region capacity exhausted
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Any other provider failure
    #[error("provider error: {0}")]
    Provider(String),
}

impl DriverError {
    /// Check if error is transient and worth retrying
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout { .. } | DriverError::RateLimited(_) | DriverError::Unavailable(_)
        )
    }

    /// Check if error refers to a missing machine
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::MachineNotFound(_))
    }
}

/// A bulk start that failed part-way
///
/// `started` holds every machine the provider launched before the failure,
/// so callers can account for them.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("started {} of {requested} machine(s) before failing: {cause}", .started.len())]
pub struct StartMachinesError {
    /// Number of machines asked for
    pub requested: usize,
    /// Machines launched before the failure
    pub started: Vec<Machine>,
    /// Failure that stopped the request
    #[source]
    pub cause: DriverError,
}

impl StartMachinesError {
    pub fn new(requested: usize, started: Vec<Machine>, cause: DriverError) -> Self {
        Self {
            requested,
            started,
            cause,
        }
    }

    /// Failure before any machine was launched
    #[must_use]
    pub fn none_started(requested: usize, cause: DriverError) -> Self {
        Self::new(requested, Vec::new(), cause)
    }
}

/// A bulk termination where some machines could not be terminated
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to terminate {} machine(s): {}", .failures.len(), failed_ids(.failures))]
pub struct TerminateMachinesError {
    /// Machines confirmed terminated
    pub succeeded: Vec<String>,
    /// Per-machine failures
    pub failures: BTreeMap<String, DriverError>,
}

impl TerminateMachinesError {
    pub fn new(succeeded: Vec<String>, failures: BTreeMap<String, DriverError>) -> Self {
        Self {
            succeeded,
            failures,
        }
    }
}

fn failed_ids(failures: &BTreeMap<String, DriverError>) -> String {
    failures.keys().cloned().collect::<Vec<_>>().join(", ")
}
