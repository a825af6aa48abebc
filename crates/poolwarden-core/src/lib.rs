//! poolwarden-core: Resize planning and pool reconciliation
//!
//! Implements the `ResizePlanner`, the termination queue with victim
//! selection, and the `PoolControllerActor` that converges a machine pool
//! to its desired size using kameo.

pub mod actor;
pub mod billing;
pub mod config;
pub mod error;
pub mod message;
pub mod overlay;
pub mod planner;
pub mod state;
pub mod termination;
pub mod victim;

pub use actor::controller::{DriverFactory, PoolControllerActor, PoolControllerArgs};
pub use config::{PoolConfig, PoolFetchConfig, PoolUpdateConfig, RetriesConfig, ScaleInConfig};
pub use error::{CoreError, PlanError};
pub use message::{
    AttachMachine, Configure, ControllerStatus, DetachMachine, GetConfiguration, GetMachinePool,
    GetPoolSize, GetStatus, Reconcile, ReconcileReport, SetDesiredSize, SetMembershipStatus,
    SetServiceState, Start, Stop, TerminateMachine,
};
pub use planner::{ResizePlan, ResizePlanner};
pub use state::ControllerState;
pub use termination::{ScheduledTermination, TerminationQueue};
pub use victim::{VictimSelectionPolicy, VictimSelector};
