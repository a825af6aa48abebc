//! Actor implementations

pub mod controller;

pub use controller::{DriverFactory, PoolControllerActor, PoolControllerArgs};
