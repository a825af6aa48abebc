//! poolwarden-driver: Cloud provider abstraction
//!
//! Provides the `Driver` trait that every provider integration implements,
//! its error taxonomy, and an in-memory simulated provider.

pub mod error;
pub mod simulated;
pub mod traits;

pub use error::{DriverError, StartMachinesError, TerminateMachinesError};
pub use simulated::{SimulatedDriver, SimulatedSettings};
pub use traits::{Driver, DriverConfig};
