//! Pool configuration document

use std::time::Duration;

use poolwarden_driver::DriverConfig;
use poolwarden_fetch::{CacheSettings, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::billing::BILLING_INTERVAL_SECS;
use crate::error::CoreError;
use crate::victim::VictimSelectionPolicy;

/// Configuration of one machine pool
///
/// Applied as a whole; a reconfiguration replaces the previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, used as a prefix for machine names by most drivers
    pub name: String,
    /// Provider driver and its settings
    pub driver: DriverConfig,
    /// Initial desired size; learned from the pool when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_size: Option<usize>,
    #[serde(default)]
    pub scale_in: ScaleInConfig,
    #[serde(default)]
    pub pool_fetch: PoolFetchConfig,
    #[serde(default)]
    pub pool_update: PoolUpdateConfig,
}

/// How victims are chosen and scheduled on scale-in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleInConfig {
    #[serde(default)]
    pub victim_selection_policy: VictimSelectionPolicy,
    /// Seconds before the next instance hour at which victims are terminated
    #[serde(default)]
    pub instance_hour_margin_secs: u64,
}

/// Retry settings for live pool fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetriesConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    3000
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl RetriesConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }
}

/// Pool snapshot caching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFetchConfig {
    #[serde(default)]
    pub retries: RetriesConfig,
    /// Seconds between background pool refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Maximum age in seconds of a snapshot that may be served
    #[serde(default = "default_reachability_timeout_secs")]
    pub reachability_timeout_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_reachability_timeout_secs() -> u64 {
    300
}

impl Default for PoolFetchConfig {
    fn default() -> Self {
        Self {
            retries: RetriesConfig::default(),
            refresh_interval_secs: default_refresh_interval_secs(),
            reachability_timeout_secs: default_reachability_timeout_secs(),
        }
    }
}

impl PoolFetchConfig {
    #[must_use]
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            reachability_timeout: Duration::from_secs(self.reachability_timeout_secs),
        }
    }
}

/// Reconciliation schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUpdateConfig {
    /// Seconds between reconciliation cycles
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
}

fn default_update_interval_secs() -> u64 {
    60
}

impl Default for PoolUpdateConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
        }
    }
}

impl PoolUpdateConfig {
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

impl PoolConfig {
    /// Create a configuration with default scheduling for the given driver
    pub fn new(name: impl Into<String>, driver: DriverConfig) -> Self {
        Self {
            name: name.into(),
            driver,
            desired_size: None,
            scale_in: ScaleInConfig::default(),
            pool_fetch: PoolFetchConfig::default(),
            pool_update: PoolUpdateConfig::default(),
        }
    }

    /// Check the configuration for values the controller cannot run with
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: &str| Err(CoreError::ConfigError(msg.to_string()));

        if self.name.trim().is_empty() {
            return invalid("name must not be empty");
        }
        if self.driver.kind.trim().is_empty() {
            return invalid("driver.kind must not be empty");
        }
        if self.scale_in.instance_hour_margin_secs >= BILLING_INTERVAL_SECS.unsigned_abs() {
            return invalid("scale_in.instance_hour_margin_secs must be below 3600");
        }
        if self.pool_fetch.retries.initial_backoff_ms == 0 {
            return invalid("pool_fetch.retries.initial_backoff_ms must be positive");
        }
        if self.pool_fetch.refresh_interval_secs == 0 {
            return invalid("pool_fetch.refresh_interval_secs must be positive");
        }
        if self.pool_fetch.reachability_timeout_secs < self.pool_fetch.refresh_interval_secs {
            return invalid(
                "pool_fetch.reachability_timeout_secs must not be shorter than refresh_interval_secs",
            );
        }
        if self.pool_update.update_interval_secs == 0 {
            return invalid("pool_update.update_interval_secs must be positive");
        }
        Ok(())
    }
}
