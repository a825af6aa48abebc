use std::sync::Arc;

use async_trait::async_trait;
use kameo::actor::{ActorRef, Spawn};
use kameo::error::SendError;
use serde_json::json;

use poolwarden_api::{Machine, MachineState, PoolEvent, ServiceState};
use poolwarden_core::*;
use poolwarden_driver::{Driver, DriverConfig, SimulatedDriver};
use poolwarden_fetch::{FetchError, StateStore};

/// Factory handing out one shared simulated driver
struct SharedDriverFactory {
    driver: Arc<SimulatedDriver>,
}

#[async_trait]
impl DriverFactory for SharedDriverFactory {
    async fn create_driver(&self, config: &DriverConfig) -> Result<Arc<dyn Driver>, CoreError> {
        match config.kind.as_str() {
            "simulated" => Ok(self.driver.clone()),
            other => Err(CoreError::ConfigError(format!("unknown driver kind: {other}"))),
        }
    }
}

fn pool_config(settings: serde_json::Value, desired_size: Option<usize>) -> PoolConfig {
    let mut config = PoolConfig::new(
        "workers",
        DriverConfig {
            kind: "simulated".to_string(),
            settings,
        },
    );
    config.desired_size = desired_size;
    config.pool_fetch.retries = RetriesConfig {
        max_retries: 0,
        initial_backoff_ms: 1,
    };
    config.pool_fetch.refresh_interval_secs = 3600;
    config.pool_fetch.reachability_timeout_secs = 3600;
    config.pool_update.update_interval_secs = 3600;
    config
}

fn spawn_controller(driver: Arc<SimulatedDriver>) -> ActorRef<PoolControllerActor> {
    PoolControllerActor::spawn(PoolControllerArgs::new(Arc::new(SharedDriverFactory {
        driver,
    })))
}

async fn started_controller(
    config: PoolConfig,
) -> (ActorRef<PoolControllerActor>, Arc<SimulatedDriver>) {
    let driver = Arc::new(SimulatedDriver::new());
    let controller = spawn_controller(driver.clone());

    controller.ask(Configure { config }).await.unwrap();
    controller.ask(Start).await.unwrap();

    (controller, driver)
}

async fn allocated(driver: &SimulatedDriver) -> usize {
    driver
        .snapshot()
        .await
        .iter()
        .filter(|m| m.is_allocated())
        .count()
}

#[tokio::test]
async fn test_start_requires_configuration() {
    let controller = spawn_controller(Arc::new(SimulatedDriver::new()));

    let err = controller.ask(Start).await.unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::NotConfigured)
    ));

    let err = controller.ask(GetConfiguration).await.unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::NotConfigured)
    ));

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Unconfigured);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let controller = spawn_controller(Arc::new(SimulatedDriver::new()));

    let mut config = pool_config(json!({}), Some(1));
    config.scale_in.instance_hour_margin_secs = 3600;
    let err = controller.ask(Configure { config }).await.unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::ConfigError(_))
    ));

    let mut config = pool_config(json!({}), Some(1));
    config.driver.kind = "carrier-pigeon".to_string();
    let err = controller.ask(Configure { config }).await.unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::ConfigError(_))
    ));

    let config = pool_config(json!({ "no_such_setting": true }), Some(1));
    let err = controller.ask(Configure { config }).await.unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::ConfigError(_))
    ));

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Unconfigured);
}

#[tokio::test]
async fn test_configure_then_start() {
    let driver = Arc::new(SimulatedDriver::new());
    let controller = spawn_controller(driver.clone());
    let config = pool_config(json!({ "initial_machines": 2 }), Some(2));

    controller
        .ask(Configure {
            config: config.clone(),
        })
        .await
        .unwrap();
    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Stopped);
    assert_eq!(status.pool_name.as_deref(), Some("workers"));
    assert_eq!(controller.ask(GetConfiguration).await.unwrap(), config);

    let err = controller.ask(GetMachinePool).await.unwrap_err();
    assert!(matches!(err, SendError::HandlerError(CoreError::NotStarted)));

    controller.ask(Start).await.unwrap();
    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Started);

    let pool = controller.ask(GetMachinePool).await.unwrap();
    assert_eq!(pool.effective_count(), 2);
}

#[tokio::test]
async fn test_scale_out_to_desired_size() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 1 }), Some(3))).await;

    controller.ask(Reconcile).await.unwrap();
    assert_eq!(allocated(&driver).await, 3);

    // Started machines are accounted for before the cache catches up
    let report = controller.ask(Reconcile).await.unwrap();
    assert!(report.started.is_empty());
    assert_eq!(allocated(&driver).await, 3);

    let size = controller.ask(GetPoolSize).await.unwrap();
    assert_eq!(size.desired, 3);
    assert_eq!(size.allocated, 3);
    assert_eq!(size.effective, 3);
}

#[tokio::test]
async fn test_desired_size_learned_from_pool() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 2 }), None)).await;

    let report = controller.ask(Reconcile).await.unwrap();
    assert_eq!(report.desired_size, 2);
    assert!(report.started.is_empty());

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.desired_size, Some(2));
    assert_eq!(allocated(&driver).await, 2);
}

#[tokio::test]
async fn test_scale_in_without_margin_terminates_immediately() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 3 }), Some(1))).await;

    controller.ask(Reconcile).await.unwrap();

    assert_eq!(allocated(&driver).await, 1);
    let status = controller.ask(GetStatus).await.unwrap();
    assert!(status.scheduled_terminations.is_empty());

    // Terminated machines are not terminated again
    let report = controller.ask(Reconcile).await.unwrap();
    assert!(report.terminated.is_empty());
    assert!(report.scheduled.is_empty());
}

#[tokio::test]
async fn test_scale_in_with_margin_queues_victims_and_spares_them() {
    let mut config = pool_config(json!({ "initial_machines": 3 }), Some(1));
    config.scale_in.instance_hour_margin_secs = 1800;
    let (controller, driver) = started_controller(config).await;

    controller.ask(Reconcile).await.unwrap();

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.scheduled_terminations.len(), 2);
    assert_eq!(allocated(&driver).await, 3);

    controller
        .ask(SetDesiredSize { desired_size: 3 })
        .await
        .unwrap();
    controller.ask(Reconcile).await.unwrap();

    let status = controller.ask(GetStatus).await.unwrap();
    assert!(status.scheduled_terminations.is_empty());
    assert_eq!(allocated(&driver).await, 3);
}

#[tokio::test]
async fn test_partial_start_is_recorded() {
    let driver = Arc::new(SimulatedDriver::new());
    let args = PoolControllerArgs::new(Arc::new(SharedDriverFactory {
        driver: driver.clone(),
    }));
    let mut events = args.subscribe();
    let controller = PoolControllerActor::spawn(args);

    let config = pool_config(json!({ "initial_machines": 1, "quota": 2 }), Some(4));
    controller.ask(Configure { config }).await.unwrap();
    controller.ask(Start).await.unwrap();

    let report = controller.ask(Reconcile).await.unwrap();
    assert!(report.has_failures());
    assert_eq!(allocated(&driver).await, 2);

    let status = controller.ask(GetStatus).await.unwrap();
    assert!(status.last_error.is_some());

    let mut started = Vec::new();
    let mut resize_alerts = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            PoolEvent::MachinesStarted { machines } => started.extend(machines),
            PoolEvent::Alert { topic, .. } if topic == poolwarden_api::events::TOPIC_RESIZE => {
                resize_alerts += 1;
            }
            _ => {}
        }
    }
    assert_eq!(started, vec!["workers-0002".to_string()]);
    assert!(resize_alerts >= 1);
}

#[tokio::test]
async fn test_failed_termination_stays_scheduled() {
    let driver = Arc::new(SimulatedDriver::new());
    driver.fail_next_terminations(u32::MAX).await;
    let controller = spawn_controller(driver.clone());
    controller
        .ask(Configure {
            config: pool_config(json!({ "initial_machines": 2 }), Some(1)),
        })
        .await
        .unwrap();
    controller.ask(Start).await.unwrap();

    let report = controller.ask(Reconcile).await.unwrap();
    assert!(report.terminated.is_empty());
    assert!(report.has_failures());

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.scheduled_terminations.len(), 1);
    assert!(status.last_error.is_some());
    let victim = status.scheduled_terminations[0].machine_id().to_string();
    assert_eq!(allocated(&driver).await, 2);

    driver.fail_next_terminations(0).await;
    controller.ask(Reconcile).await.unwrap();

    let status = controller.ask(GetStatus).await.unwrap();
    assert!(status.scheduled_terminations.is_empty());
    assert_eq!(allocated(&driver).await, 1);
    let machines = driver.snapshot().await;
    let victim_state = machines.iter().find(|m| m.id == victim).unwrap().machine_state;
    assert_eq!(victim_state, MachineState::Terminated);
}

#[tokio::test]
async fn test_reconcile_fails_while_pool_unreachable() {
    let driver = Arc::new(SimulatedDriver::new());
    let controller = spawn_controller(driver.clone());

    controller
        .ask(Configure {
            config: pool_config(json!({ "initial_machines": 1 }), Some(2)),
        })
        .await
        .unwrap();
    driver.fail_next_lists(1).await;
    controller.ask(Start).await.unwrap();

    let err = controller.ask(Reconcile).await.unwrap_err();
    assert!(matches!(err, SendError::HandlerError(CoreError::Fetch(_))));
    assert_eq!(allocated(&driver).await, 1);

    let status = controller.ask(GetStatus).await.unwrap();
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn test_stop_halts_reconciliation() {
    let (controller, _driver) =
        started_controller(pool_config(json!({ "initial_machines": 1 }), Some(1))).await;

    controller.ask(Stop).await.unwrap();
    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Stopped);

    let err = controller.ask(Reconcile).await.unwrap_err();
    assert!(matches!(err, SendError::HandlerError(CoreError::NotStarted)));

    controller.ask(Stop).await.unwrap();
    controller.ask(Start).await.unwrap();
    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Started);
}

#[tokio::test]
async fn test_reconfigure_while_started_keeps_running() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 1 }), Some(1))).await;

    controller
        .ask(Configure {
            config: pool_config(json!({ "initial_machines": 1 }), Some(2)),
        })
        .await
        .unwrap();

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Started);
    assert_eq!(status.desired_size, Some(2));

    controller.ask(Reconcile).await.unwrap();
    assert_eq!(allocated(&driver).await, 2);
}

#[tokio::test]
async fn test_terminate_machine_with_decrement() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 3 }), Some(3))).await;

    controller
        .ask(TerminateMachine {
            machine_id: "workers-0001".to_string(),
            decrement_desired: true,
        })
        .await
        .unwrap();

    let status = controller.ask(GetStatus).await.unwrap();
    assert_eq!(status.desired_size, Some(2));

    controller.ask(Reconcile).await.unwrap();
    assert_eq!(allocated(&driver).await, 2);
}

#[tokio::test]
async fn test_terminate_machine_without_decrement_is_replaced() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 2 }), Some(2))).await;

    controller
        .ask(TerminateMachine {
            machine_id: "workers-0002".to_string(),
            decrement_desired: false,
        })
        .await
        .unwrap();
    controller.ask(Reconcile).await.unwrap();

    assert_eq!(allocated(&driver).await, 2);
    let machines = driver.snapshot().await;
    assert_eq!(
        machines
            .iter()
            .find(|m| m.id == "workers-0002")
            .unwrap()
            .machine_state,
        MachineState::Terminated
    );
}

#[tokio::test]
async fn test_terminate_unknown_machine() {
    let (controller, _driver) =
        started_controller(pool_config(json!({ "initial_machines": 1 }), Some(1))).await;

    let err = controller
        .ask(TerminateMachine {
            machine_id: "i-missing".to_string(),
            decrement_desired: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::MachineNotFound(id)) if id == "i-missing"
    ));
}

#[tokio::test]
async fn test_attach_and_detach() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 2 }), Some(2))).await;
    driver
        .add_unmanaged(Machine::new("spare-1", MachineState::Running))
        .await;

    controller
        .ask(AttachMachine {
            machine_id: "spare-1".to_string(),
        })
        .await
        .unwrap();

    let pool = controller.ask(GetMachinePool).await.unwrap();
    assert!(pool.contains("spare-1"));
    assert_eq!(controller.ask(GetPoolSize).await.unwrap().desired, 3);

    controller
        .ask(DetachMachine {
            machine_id: "spare-1".to_string(),
            decrement_desired: true,
        })
        .await
        .unwrap();

    let pool = controller.ask(GetMachinePool).await.unwrap();
    assert!(!pool.contains("spare-1"));
    assert_eq!(controller.ask(GetPoolSize).await.unwrap().desired, 2);

    let err = controller
        .ask(AttachMachine {
            machine_id: "spare-2".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::MachineNotFound(_))
    ));
}

#[tokio::test]
async fn test_out_of_service_machine_is_replaced_not_terminated() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 2 }), Some(2))).await;
    controller.ask(Reconcile).await.unwrap();

    controller
        .ask(SetServiceState {
            machine_id: "workers-0001".to_string(),
            service_state: ServiceState::OutOfService,
        })
        .await
        .unwrap();

    let size = controller.ask(GetPoolSize).await.unwrap();
    assert_eq!(size.allocated, 2);
    assert_eq!(size.effective, 1);

    controller.ask(Reconcile).await.unwrap();
    assert_eq!(allocated(&driver).await, 3);
}

#[tokio::test]
async fn test_protected_machines_survive_scale_in() {
    let (controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 2 }), Some(2))).await;
    controller.ask(Reconcile).await.unwrap();

    controller
        .ask(SetMembershipStatus {
            machine_id: "workers-0001".to_string(),
            membership_status: poolwarden_api::MembershipStatus::protected(),
        })
        .await
        .unwrap();
    controller
        .ask(SetDesiredSize { desired_size: 1 })
        .await
        .unwrap();
    controller.ask(Reconcile).await.unwrap();

    let machines = driver.snapshot().await;
    let state_of = |id: &str| {
        machines
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.machine_state)
            .unwrap()
    };
    assert_eq!(state_of("workers-0001"), MachineState::Running);
    assert_eq!(state_of("workers-0002"), MachineState::Terminated);
}

#[tokio::test]
async fn test_configuration_restored_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = pool_config(json!({ "initial_machines": 1 }), Some(1));

    let driver = Arc::new(SimulatedDriver::new());
    let args = PoolControllerArgs::new(Arc::new(SharedDriverFactory {
        driver: driver.clone(),
    }))
    .with_store(StateStore::new(dir.path()));
    let controller = PoolControllerActor::spawn(args);
    controller
        .ask(Configure {
            config: config.clone(),
        })
        .await
        .unwrap();
    controller.stop_gracefully().await.ok();

    let args = PoolControllerArgs::new(Arc::new(SharedDriverFactory { driver }))
        .with_store(StateStore::new(dir.path()));
    let restarted = PoolControllerActor::spawn(args);

    assert_eq!(restarted.ask(GetConfiguration).await.unwrap(), config);
    let status = restarted.ask(GetStatus).await.unwrap();
    assert_eq!(status.state, ControllerState::Stopped);
}

#[tokio::test]
async fn test_started_controller_reconciles_on_its_own() {
    let (_controller, driver) =
        started_controller(pool_config(json!({ "initial_machines": 1 }), Some(2))).await;

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while allocated(&driver).await < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_snapshot_of_previous_pool_is_not_reused() {
    let dir = tempfile::tempdir().unwrap();

    let args = PoolControllerArgs::new(Arc::new(SharedDriverFactory {
        driver: Arc::new(SimulatedDriver::new()),
    }))
    .with_store(StateStore::new(dir.path()));
    let controller = PoolControllerActor::spawn(args);
    controller
        .ask(Configure {
            config: pool_config(json!({ "initial_machines": 2 }), Some(2)),
        })
        .await
        .unwrap();
    controller.ask(Start).await.unwrap();
    controller.ask(Stop).await.unwrap();
    controller.stop_gracefully().await.ok();
    assert!(dir.path().join("pool.json").exists());
    std::fs::remove_file(dir.path().join("config.json")).unwrap();

    let driver = Arc::new(SimulatedDriver::new());
    driver.fail_next_lists(u32::MAX).await;
    let args = PoolControllerArgs::new(Arc::new(SharedDriverFactory {
        driver: driver.clone(),
    }))
    .with_store(StateStore::new(dir.path()));
    let controller = PoolControllerActor::spawn(args);
    let mut config = pool_config(json!({}), Some(0));
    config.name = "other".to_string();
    controller.ask(Configure { config }).await.unwrap();
    controller.ask(Start).await.unwrap();

    let err = controller.ask(GetMachinePool).await.unwrap_err();
    assert!(matches!(
        err,
        SendError::HandlerError(CoreError::Fetch(FetchError::Unreachable { .. }))
    ));

    let err = controller.ask(Reconcile).await.unwrap_err();
    assert!(matches!(err, SendError::HandlerError(CoreError::Fetch(_))));
    let status = controller.ask(GetStatus).await.unwrap();
    assert!(status.scheduled_terminations.is_empty());
}
