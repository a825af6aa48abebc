//! Driver factory selecting the provider implementation by kind

use std::sync::Arc;

use async_trait::async_trait;
use poolwarden_core::{CoreError, DriverFactory};
use poolwarden_driver::{Driver, DriverConfig, SimulatedDriver};

/// Default implementation of `DriverFactory`
#[derive(Debug, Default)]
pub struct DefaultDriverFactory;

impl DefaultDriverFactory {
    /// Create a new factory instance
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriverFactory for DefaultDriverFactory {
    async fn create_driver(&self, config: &DriverConfig) -> Result<Arc<dyn Driver>, CoreError> {
        match config.kind.as_str() {
            "simulated" => Ok(Arc::new(SimulatedDriver::new())),
            other => Err(CoreError::ConfigError(format!(
                "unsupported driver kind: {other}"
            ))),
        }
    }
}
