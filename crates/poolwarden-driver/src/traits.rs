//! Provider driver trait

use async_trait::async_trait;
use poolwarden_api::{Machine, MembershipStatus, ServiceState};
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, StartMachinesError, TerminateMachinesError};

/// Provider selection and provider-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Provider kind, resolved to an implementation by a driver factory
    pub kind: String,
    /// Settings interpreted by the selected driver
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Capabilities a cloud provider integration offers to the pool controller
///
/// Implementations scope every call to the pool named in `configure`.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Apply settings; called before any other operation and again on reconfiguration
    async fn configure(&self, pool_name: &str, config: &DriverConfig) -> Result<(), DriverError>;

    /// List all machines that belong to the pool
    async fn list_machines(&self) -> Result<Vec<Machine>, DriverError>;

    /// Launch `count` new machines
    async fn start_machines(&self, count: usize) -> Result<Vec<Machine>, StartMachinesError>;

    /// Terminate the given machines
    async fn terminate_machines(&self, ids: &[String]) -> Result<(), TerminateMachinesError>;

    /// Adopt an existing machine into the pool
    async fn attach_machine(&self, id: &str) -> Result<(), DriverError>;

    /// Release a machine from the pool without terminating it
    async fn detach_machine(&self, id: &str) -> Result<(), DriverError>;

    async fn set_service_state(&self, id: &str, state: ServiceState) -> Result<(), DriverError>;

    async fn set_membership_status(
        &self,
        id: &str,
        status: MembershipStatus,
    ) -> Result<(), DriverError>;

    /// Short provider name for logging
    fn driver_type(&self) -> &'static str;
}
