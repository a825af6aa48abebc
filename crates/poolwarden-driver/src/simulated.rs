//! In-memory simulated provider
//!
//! Behaves like a small cloud: launched machines boot from `PENDING` to
//! `RUNNING`, an optional quota caps the pool, and list and termination
//! failures can be injected to exercise failure handling.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use poolwarden_api::{Machine, MachineState, MembershipStatus, ServiceState};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{DriverError, StartMachinesError, TerminateMachinesError};
use crate::traits::{Driver, DriverConfig};

/// Settings accepted by the simulated driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatedSettings {
    /// Maximum number of allocated machines
    #[serde(default)]
    pub quota: Option<usize>,
    /// Seconds a machine stays `PENDING` after launch
    #[serde(default)]
    pub boot_secs: u64,
    /// Running machines created on first configuration
    #[serde(default)]
    pub initial_machines: usize,
}

#[derive(Debug, Default)]
struct SimulatedCloud {
    pool_name: Option<String>,
    settings: SimulatedSettings,
    /// Machines in the pool, ordered by id
    machines: BTreeMap<String, Machine>,
    /// Machines known to the provider but outside the pool
    unmanaged: HashMap<String, Machine>,
    next_id: u64,
    list_failures: u32,
    terminate_failures: u32,
    list_calls: u64,
}

impl SimulatedCloud {
    fn ensure_configured(&self) -> Result<(), DriverError> {
        if self.pool_name.is_none() {
            return Err(DriverError::NotConfigured);
        }
        Ok(())
    }

    fn launch(&mut self) -> Machine {
        self.next_id += 1;
        let prefix = self.pool_name.as_deref().unwrap_or("sim");
        let machine = Machine::new(format!("{prefix}-{:04}", self.next_id), MachineState::Pending)
            .with_launch_time(Utc::now());
        self.machines.insert(machine.id.clone(), machine.clone());
        machine
    }

    fn advance_lifecycle(&mut self) {
        let now = Utc::now();
        let boot_time = Duration::seconds(i64::try_from(self.settings.boot_secs).unwrap_or(i64::MAX));
        for machine in self.machines.values_mut() {
            if machine.machine_state == MachineState::Pending
                && machine
                    .launch_time
                    .is_some_and(|launched| launched + boot_time <= now)
            {
                machine.machine_state = MachineState::Running;
            }
        }
    }

    fn allocated(&self) -> usize {
        self.machines.values().filter(|m| m.is_allocated()).count()
    }

    fn machine_mut(&mut self, id: &str) -> Result<&mut Machine, DriverError> {
        self.machines
            .get_mut(id)
            .ok_or_else(|| DriverError::MachineNotFound(id.to_string()))
    }
}

/// Simulated driver holding its machines in memory
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    cloud: Mutex<SimulatedCloud>,
}

impl SimulatedDriver {
    /// Create an unconfigured simulated driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `list_machines` fail with a transient error
    pub async fn fail_next_lists(&self, count: u32) {
        self.cloud.lock().await.list_failures = count;
    }

    /// Make the next `count` calls to `terminate_machines` fail for every id
    pub async fn fail_next_terminations(&self, count: u32) {
        self.cloud.lock().await.terminate_failures = count;
    }

    /// Number of `list_machines` calls received so far
    pub async fn list_calls(&self) -> u64 {
        self.cloud.lock().await.list_calls
    }

    /// Register a machine that exists at the provider but outside the pool
    pub async fn add_unmanaged(&self, machine: Machine) {
        let mut cloud = self.cloud.lock().await;
        cloud.unmanaged.insert(machine.id.clone(), machine);
    }

    /// Current machines, without lifecycle progression or fault injection
    pub async fn snapshot(&self) -> Vec<Machine> {
        self.cloud.lock().await.machines.values().cloned().collect()
    }
}

#[async_trait]
impl Driver for SimulatedDriver {
    #[instrument(skip(self, config))]
    async fn configure(&self, pool_name: &str, config: &DriverConfig) -> Result<(), DriverError> {
        let settings: SimulatedSettings = if config.settings.is_null() {
            SimulatedSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())
                .map_err(|e| DriverError::ConfigError(e.to_string()))?
        };

        let mut cloud = self.cloud.lock().await;
        let first_configuration = cloud.pool_name.is_none();
        cloud.pool_name = Some(pool_name.to_string());

        if first_configuration {
            let now = Utc::now();
            for _ in 0..settings.initial_machines {
                let mut machine = cloud.launch();
                machine.machine_state = MachineState::Running;
                machine.launch_time = Some(now);
                cloud.machines.insert(machine.id.clone(), machine);
            }
        }

        info!(
            pool = %pool_name,
            quota = ?settings.quota,
            boot_secs = settings.boot_secs,
            "simulated driver configured"
        );
        cloud.settings = settings;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_machines(&self) -> Result<Vec<Machine>, DriverError> {
        let mut cloud = self.cloud.lock().await;
        cloud.list_calls += 1;
        cloud.ensure_configured()?;

        if cloud.list_failures > 0 {
            cloud.list_failures -= 1;
            warn!(remaining = cloud.list_failures, "injected list failure");
            return Err(DriverError::Unavailable("simulated outage".to_string()));
        }

        cloud.advance_lifecycle();
        debug!(machines = cloud.machines.len(), "listed machines");
        Ok(cloud.machines.values().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn start_machines(&self, count: usize) -> Result<Vec<Machine>, StartMachinesError> {
        let mut cloud = self.cloud.lock().await;
        cloud
            .ensure_configured()
            .map_err(|e| StartMachinesError::none_started(count, e))?;

        let mut started = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(quota) = cloud.settings.quota
                && cloud.allocated() >= quota
            {
                warn!(quota, started = started.len(), "quota reached");
                return Err(StartMachinesError::new(
                    count,
                    started,
                    DriverError::CapacityExceeded(format!("quota of {quota} machines reached")),
                ));
            }
            started.push(cloud.launch());
        }

        info!(count, "started machines");
        Ok(started)
    }

    #[instrument(skip(self))]
    async fn terminate_machines(&self, ids: &[String]) -> Result<(), TerminateMachinesError> {
        let mut cloud = self.cloud.lock().await;
        if let Err(e) = cloud.ensure_configured() {
            let failures = ids.iter().map(|id| (id.clone(), e.clone())).collect();
            return Err(TerminateMachinesError::new(Vec::new(), failures));
        }

        if cloud.terminate_failures > 0 {
            cloud.terminate_failures -= 1;
            warn!(remaining = cloud.terminate_failures, "injected termination failure");
            let error = DriverError::Unavailable("simulated outage".to_string());
            let failures = ids.iter().map(|id| (id.clone(), error.clone())).collect();
            return Err(TerminateMachinesError::new(Vec::new(), failures));
        }

        let mut succeeded = Vec::new();
        let mut failures = BTreeMap::new();
        for id in ids {
            match cloud.machine_mut(id) {
                Ok(machine) => {
                    machine.machine_state = MachineState::Terminated;
                    succeeded.push(id.clone());
                }
                Err(e) => {
                    failures.insert(id.clone(), e);
                }
            }
        }

        info!(terminated = succeeded.len(), failed = failures.len(), "terminated machines");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TerminateMachinesError::new(succeeded, failures))
        }
    }

    async fn attach_machine(&self, id: &str) -> Result<(), DriverError> {
        let mut cloud = self.cloud.lock().await;
        cloud.ensure_configured()?;

        let machine = cloud
            .unmanaged
            .remove(id)
            .ok_or_else(|| DriverError::MachineNotFound(id.to_string()))?;
        cloud.machines.insert(machine.id.clone(), machine);
        info!(machine = %id, "attached machine");
        Ok(())
    }

    async fn detach_machine(&self, id: &str) -> Result<(), DriverError> {
        let mut cloud = self.cloud.lock().await;
        cloud.ensure_configured()?;

        let machine = cloud
            .machines
            .remove(id)
            .ok_or_else(|| DriverError::MachineNotFound(id.to_string()))?;
        cloud.unmanaged.insert(machine.id.clone(), machine);
        info!(machine = %id, "detached machine");
        Ok(())
    }

    async fn set_service_state(&self, id: &str, state: ServiceState) -> Result<(), DriverError> {
        let mut cloud = self.cloud.lock().await;
        cloud.ensure_configured()?;
        cloud.machine_mut(id)?.service_state = state;
        Ok(())
    }

    async fn set_membership_status(
        &self,
        id: &str,
        status: MembershipStatus,
    ) -> Result<(), DriverError> {
        let mut cloud = self.cloud.lock().await;
        cloud.ensure_configured()?;
        cloud.machine_mut(id)?.membership_status = status;
        Ok(())
    }

    fn driver_type(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(settings: serde_json::Value) -> DriverConfig {
        DriverConfig {
            kind: "simulated".to_string(),
            settings,
        }
    }

    async fn configured(settings: serde_json::Value) -> SimulatedDriver {
        let driver = SimulatedDriver::new();
        driver.configure("web", &config(settings)).await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_requires_configuration() {
        let driver = SimulatedDriver::new();

        assert_eq!(
            driver.list_machines().await,
            Err(DriverError::NotConfigured)
        );
    }

    #[tokio::test]
    async fn test_rejects_unknown_settings() {
        let driver = SimulatedDriver::new();
        let result = driver
            .configure("web", &config(serde_json::json!({"region": "eu"})))
            .await;

        assert!(matches!(result, Err(DriverError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_initial_machines_are_running() {
        let driver = configured(serde_json::json!({"initial_machines": 2})).await;
        let machines = driver.list_machines().await.unwrap();

        assert_eq!(machines.len(), 2);
        assert!(machines.iter().all(|m| m.machine_state == MachineState::Running));
        assert_eq!(machines[0].id, "web-0001");
    }

    #[tokio::test]
    async fn test_started_machines_boot_immediately_without_boot_time() {
        let driver = configured(serde_json::Value::Null).await;

        let started = driver.start_machines(2).await.unwrap();
        assert!(started.iter().all(|m| m.machine_state == MachineState::Pending));

        let listed = driver.list_machines().await.unwrap();
        assert!(listed.iter().all(|m| m.machine_state == MachineState::Running));
    }

    #[tokio::test]
    async fn test_quota_causes_partial_start() {
        let driver = configured(serde_json::json!({"quota": 3, "initial_machines": 1})).await;

        let err = driver.start_machines(4).await.unwrap_err();

        assert_eq!(err.requested, 4);
        assert_eq!(err.started.len(), 2);
        assert!(matches!(err.cause, DriverError::CapacityExceeded(_)));
        assert_eq!(driver.list_machines().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_terminate_reports_unknown_machines() {
        let driver = configured(serde_json::json!({"initial_machines": 1})).await;

        let err = driver
            .terminate_machines(&["web-0001".to_string(), "web-9999".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.succeeded, vec!["web-0001".to_string()]);
        assert!(err.failures["web-9999"].is_not_found());

        let machines = driver.list_machines().await.unwrap();
        assert_eq!(machines[0].machine_state, MachineState::Terminated);
    }

    #[tokio::test]
    async fn test_injected_list_failures() {
        let driver = configured(serde_json::Value::Null).await;
        driver.fail_next_lists(2).await;

        assert!(driver.list_machines().await.unwrap_err().is_retryable());
        assert!(driver.list_machines().await.is_err());
        assert!(driver.list_machines().await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_termination_failures() {
        let driver = configured(serde_json::json!({"initial_machines": 1})).await;
        driver.fail_next_terminations(1).await;
        let ids = ["web-0001".to_string()];

        let err = driver.terminate_machines(&ids).await.unwrap_err();
        assert!(err.succeeded.is_empty());
        assert!(err.failures["web-0001"].is_retryable());
        assert_eq!(driver.snapshot().await[0].machine_state, MachineState::Running);

        driver.terminate_machines(&ids).await.unwrap();
        assert_eq!(driver.snapshot().await[0].machine_state, MachineState::Terminated);
    }

    #[tokio::test]
    async fn test_list_calls_are_counted() {
        let driver = configured(serde_json::Value::Null).await;
        driver.fail_next_lists(1).await;

        let _ = driver.list_machines().await;
        let _ = driver.list_machines().await;

        assert_eq!(driver.list_calls().await, 2);
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let driver = configured(serde_json::Value::Null).await;
        driver
            .add_unmanaged(Machine::new("i-legacy", MachineState::Running))
            .await;

        driver.attach_machine("i-legacy").await.unwrap();
        assert_eq!(driver.snapshot().await.len(), 1);

        driver.detach_machine("i-legacy").await.unwrap();
        assert!(driver.snapshot().await.is_empty());

        assert!(driver.detach_machine("i-legacy").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_service_state_and_membership_updates() {
        let driver = configured(serde_json::json!({"initial_machines": 1})).await;

        driver
            .set_service_state("web-0001", ServiceState::OutOfService)
            .await
            .unwrap();
        driver
            .set_membership_status("web-0001", MembershipStatus::protected())
            .await
            .unwrap();

        let machine = &driver.snapshot().await[0];
        assert!(machine.is_out_of_service());
        assert!(!machine.is_evictable());
    }
}
