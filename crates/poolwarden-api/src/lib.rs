//! poolwarden-api: Shared machine pool types
//!
//! Contains the machine and pool snapshot model plus the event types
//! broadcast by the fetcher and controller.

pub mod events;
pub mod machine;
pub mod pool;

pub use events::{AlertSeverity, PoolEvent};
pub use machine::{Machine, MachineState, MembershipStatus, ServiceState};
pub use pool::{MachinePool, PoolSize};
