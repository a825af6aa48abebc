//! `PoolControllerActor`: Pool reconciliation
//!
//! Owns the termination queue and desired size of one machine pool. While
//! started, a ticker task asks the actor to reconcile on a fixed period.
//! Cycles and management requests share the actor mailbox, so at most one
//! cycle is ever in flight and no two plans race against the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, SendError};
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use poolwarden_api::events::TOPIC_RESIZE;
use poolwarden_api::{AlertSeverity, MachinePool, PoolEvent, PoolSize};
use poolwarden_driver::{Driver, DriverConfig, DriverError, TerminateMachinesError};
use poolwarden_fetch::{
    CachingPoolFetcher, FetchOptions, PoolFetcher, RetryingPoolFetcher, StateStore,
};

use crate::config::PoolConfig;
use crate::error::CoreError;
use crate::message::{
    AttachMachine, Configure, ControllerStatus, DetachMachine, GetConfiguration, GetMachinePool,
    GetPoolSize, GetStatus, Reconcile, ReconcileReport, SetDesiredSize, SetMembershipStatus,
    SetServiceState, Start, Stop, TerminateMachine,
};
use crate::overlay::PendingActions;
use crate::planner::ResizePlanner;
use crate::state::ControllerState;
use crate::termination::TerminationQueue;

/// File the last applied configuration is persisted to
pub const CONFIG_FILE: &str = "config.json";

/// Factory trait for creating provider drivers
///
/// Selects the driver implementation for a configuration; the controller
/// never branches on provider identity itself.
#[async_trait::async_trait]
pub trait DriverFactory: Send + Sync {
    /// Create an unconfigured driver for `config.kind`
    async fn create_driver(&self, config: &DriverConfig) -> Result<Arc<dyn Driver>, CoreError>;
}

/// Arguments for spawning a `PoolControllerActor`
pub struct PoolControllerArgs {
    /// Factory for creating drivers on configuration
    pub driver_factory: Arc<dyn DriverFactory>,
    /// Location of persisted configuration and pool snapshots
    pub store: Option<StateStore>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<PoolEvent>,
}

impl PoolControllerArgs {
    pub fn new(driver_factory: Arc<dyn DriverFactory>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            driver_factory,
            store: None,
            event_tx,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        self.event_tx = event_tx;
        self
    }

    /// Get an event receiver; call before spawning to see startup events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }
}

/// Applied configuration and the driver built for it
struct Configured {
    config: Arc<PoolConfig>,
    driver: Arc<dyn Driver>,
}

/// Background work of a started controller
struct Running {
    fetcher: Arc<CachingPoolFetcher>,
    shutdown_tx: watch::Sender<bool>,
    ticker: JoinHandle<()>,
}

impl Running {
    fn halt(self) {
        let _ = self.shutdown_tx.send(true);
        self.ticker.abort();
        self.fetcher.close();
    }
}

/// Controller converging one machine pool to its desired size
pub struct PoolControllerActor {
    state: ControllerState,
    configured: Option<Configured>,
    running: Option<Running>,
    desired_size: Option<usize>,
    queue: TerminationQueue,
    pending: PendingActions,
    last_reconciled: Option<chrono::DateTime<Utc>>,
    last_error: Option<String>,
    driver_factory: Arc<dyn DriverFactory>,
    store: Option<StateStore>,
    event_tx: broadcast::Sender<PoolEvent>,
    self_ref: WeakActorRef<Self>,
}

impl PoolControllerActor {
    /// Get event receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    fn pool_name(&self) -> &str {
        self.configured
            .as_ref()
            .map_or("", |configured| configured.config.name.as_str())
    }

    fn emit(&self, event: PoolEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Transition to a new state with validation and event emission
    fn transition_to(&mut self, new_state: ControllerState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(new_state) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let old_state = self.state;
        self.state = new_state;
        if old_state == new_state {
            return Ok(());
        }

        info!(
            pool = %self.pool_name(),
            from = %old_state,
            to = %new_state,
            "state transition"
        );
        self.emit(PoolEvent::ControllerStateChanged {
            from: old_state.to_string(),
            to: new_state.to_string(),
        });

        Ok(())
    }

    fn ensure_started(&self) -> Result<(), CoreError> {
        match self.state {
            ControllerState::Started => Ok(()),
            ControllerState::Stopped => Err(CoreError::NotStarted),
            ControllerState::Unconfigured => Err(CoreError::NotConfigured),
        }
    }

    fn config(&self) -> Result<Arc<PoolConfig>, CoreError> {
        self.configured
            .as_ref()
            .map(|configured| configured.config.clone())
            .ok_or(CoreError::NotConfigured)
    }

    fn driver(&self) -> Result<Arc<dyn Driver>, CoreError> {
        self.configured
            .as_ref()
            .map(|configured| configured.driver.clone())
            .ok_or(CoreError::NotConfigured)
    }

    fn update_desired_size(&mut self, desired_size: usize) {
        if self.desired_size == Some(desired_size) {
            return;
        }
        info!(
            pool = %self.pool_name(),
            from = ?self.desired_size,
            to = desired_size,
            "desired size changed"
        );
        self.emit(PoolEvent::DesiredSizeChanged {
            from: self.desired_size,
            to: desired_size,
        });
        self.desired_size = Some(desired_size);
    }

    fn decrement_desired_size(&mut self) {
        if let Some(desired_size) = self.desired_size {
            self.update_desired_size(desired_size.saturating_sub(1));
        }
    }

    /// Validate `config`, build its driver and make it current
    ///
    /// A started controller is restarted with the new settings.
    async fn apply_configuration(&mut self, config: PoolConfig) -> Result<(), CoreError> {
        config.validate()?;

        let driver = self.driver_factory.create_driver(&config.driver).await?;
        driver
            .configure(&config.name, &config.driver)
            .await
            .map_err(|e| match e {
                DriverError::ConfigError(msg) => CoreError::ConfigError(msg),
                other => CoreError::Driver(other),
            })?;

        let was_started = self.state == ControllerState::Started;
        self.halt();

        if self
            .configured
            .as_ref()
            .is_some_and(|previous| previous.config.name != config.name)
        {
            self.queue = TerminationQueue::new();
            self.pending = PendingActions::new();
            self.desired_size = None;
        }
        if let Some(desired_size) = config.desired_size {
            self.update_desired_size(desired_size);
        }

        info!(
            pool = %config.name,
            driver = driver.driver_type(),
            policy = %config.scale_in.victim_selection_policy,
            margin_secs = config.scale_in.instance_hour_margin_secs,
            "configuration applied"
        );
        self.configured = Some(Configured {
            config: Arc::new(config),
            driver,
        });
        self.transition_to(ControllerState::Stopped)?;

        if was_started {
            self.launch().await?;
        }
        Ok(())
    }

    async fn persist_configuration(&self) {
        let (Some(store), Some(configured)) = (&self.store, &self.configured) else {
            return;
        };
        if let Err(e) = store.save(CONFIG_FILE, configured.config.as_ref()).await {
            warn!(error = %e, "failed to persist configuration");
        }
    }

    async fn restore_configuration(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.load::<PoolConfig>(CONFIG_FILE).await {
            Ok(Some(config)) => {
                let name = config.name.clone();
                match self.apply_configuration(config).await {
                    Ok(()) => info!(pool = %name, "restored persisted configuration"),
                    Err(e) => warn!(pool = %name, error = %e, "ignoring persisted configuration"),
                }
            }
            Ok(None) => debug!("no persisted configuration"),
            Err(e) => warn!(error = %e, "ignoring unreadable persisted configuration"),
        }
    }

    /// Start the pool cache and the reconciliation ticker
    ///
    /// Returns once the first pool fetch attempt has completed.
    async fn launch(&mut self) -> Result<(), CoreError> {
        let config = self.config()?;
        let driver = self.driver()?;

        let delegate = RetryingPoolFetcher::new(driver, config.pool_fetch.retries.policy());
        let fetcher = Arc::new(
            CachingPoolFetcher::spawn(
                config.name.clone(),
                Arc::new(delegate),
                config.pool_fetch.cache_settings(),
                self.store.clone(),
                Some(self.event_tx.clone()),
            )
            .await,
        );
        fetcher.await_first_fetch().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = tokio::spawn(run_reconcile_loop(
            self.self_ref.clone(),
            config.pool_update.update_interval(),
            shutdown_rx,
        ));

        self.running = Some(Running {
            fetcher,
            shutdown_tx,
            ticker,
        });
        self.transition_to(ControllerState::Started)
    }

    /// Stop background work without changing state
    fn halt(&mut self) {
        if let Some(running) = self.running.take() {
            running.halt();
            debug!(pool = %self.pool_name(), "reconciliation halted");
        }
    }

    /// Cached pool with recent actions overlaid
    async fn current_pool(&mut self) -> Result<MachinePool, CoreError> {
        let running = self.running.as_ref().ok_or(CoreError::NotStarted)?;
        let pool = running.fetcher.get(FetchOptions::default()).await?;
        Ok(self.pending.apply(pool))
    }

    /// Force a cache refresh after a management change
    async fn refresh_after_change(&self) {
        if let Some(running) = &self.running
            && let Err(e) = running.fetcher.get(FetchOptions::force_refresh()).await
        {
            warn!(error = %e, "pool refresh after change failed");
        }
    }

    /// Drop queue entries for machines that are no longer effective members
    fn prune_queue(&mut self, pool: &MachinePool) {
        let dropped = self.queue.retain(|entry| {
            pool.get(entry.machine_id())
                .is_some_and(|machine| machine.is_effective_member())
        });
        for entry in dropped {
            info!(
                machine = %entry.machine_id(),
                "dropped scheduled termination of machine no longer in the pool"
            );
        }
    }

    #[instrument(skip(self), fields(pool = %self.pool_name()))]
    async fn reconcile(&mut self) -> Result<ReconcileReport, CoreError> {
        self.ensure_started()?;
        let config = self.config()?;
        let driver = self.driver()?;

        let pool = match self.current_pool().await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "skipping reconciliation, pool unavailable");
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.prune_queue(&pool);

        let now = Utc::now();
        let (net_size, desired_size, plan) = {
            let planner = ResizePlanner::new(
                &pool,
                &self.queue,
                config.scale_in.victim_selection_policy,
                config.scale_in.instance_hour_margin_secs,
            )?;
            let net_size = planner.net_size();
            let desired_size = self.desired_size.unwrap_or(net_size);
            let plan = planner.calculate_resize_plan_at(desired_size, now)?;
            (net_size, desired_size, plan)
        };
        if self.desired_size.is_none() {
            info!(desired_size, "desired size learned from pool");
            self.update_desired_size(desired_size);
        }

        let mut report = ReconcileReport::new(desired_size, net_size);

        if plan.to_request() > 0 {
            self.start_machines(driver.as_ref(), plan.to_request(), &mut report)
                .await;
        }

        if plan.to_spare() > 0 {
            for entry in self.queue.spare(plan.to_spare()) {
                info!(machine = %entry.machine_id(), "spared scheduled termination");
                report.spared.push(entry.machine.id);
            }
        }

        for entry in plan.into_terminations() {
            info!(
                machine = %entry.machine_id(),
                at = %entry.termination_time,
                "scheduled termination"
            );
            self.emit(PoolEvent::TerminationScheduled {
                machine: entry.machine.id.clone(),
                at: entry.termination_time,
            });
            report.scheduled.push(entry.machine.id.clone());
            self.queue.insert(entry);
        }

        self.terminate_due(driver.as_ref(), &mut report).await;

        self.last_reconciled = Some(Utc::now());
        self.last_error = report
            .has_failures()
            .then(|| report.failures.join("; "));

        debug!(
            desired_size,
            net_size,
            started = report.started.len(),
            spared = report.spared.len(),
            scheduled = report.scheduled.len(),
            terminated = report.terminated.len(),
            "reconciliation cycle complete"
        );
        Ok(report)
    }

    async fn start_machines(
        &mut self,
        driver: &dyn Driver,
        count: usize,
        report: &mut ReconcileReport,
    ) {
        let (started, failure) = match driver.start_machines(count).await {
            Ok(machines) => (machines, None),
            Err(e) => {
                let message = e.to_string();
                (e.started, Some(message))
            }
        };

        if !started.is_empty() {
            let ids: Vec<String> = started.iter().map(|m| m.id.clone()).collect();
            info!(count = ids.len(), machines = ?ids, "started machines");
            self.pending.record_started(started, Utc::now());
            self.emit(PoolEvent::MachinesStarted {
                machines: ids.clone(),
            });
            report.started.extend(ids);
        }

        if let Some(message) = failure {
            error!(requested = count, error = %message, "failed to start machines");
            self.emit(PoolEvent::alert(
                TOPIC_RESIZE,
                AlertSeverity::Error,
                format!("failed to start machines: {message}"),
            ));
            report.failures.push(message);
        }
    }

    /// Terminate queued machines whose time has come
    ///
    /// Only confirmed terminations leave the queue.
    async fn terminate_due(&mut self, driver: &dyn Driver, report: &mut ReconcileReport) {
        let due: Vec<String> = self
            .queue
            .due(Utc::now())
            .into_iter()
            .map(|entry| entry.machine.id)
            .collect();
        if due.is_empty() {
            return;
        }

        let terminated = match driver.terminate_machines(&due).await {
            Ok(()) => due,
            Err(TerminateMachinesError {
                succeeded,
                failures,
            }) => {
                for (id, cause) in failures {
                    if cause.is_not_found() {
                        warn!(machine = %id, "scheduled victim no longer exists");
                        self.queue.remove(&id);
                        continue;
                    }
                    error!(machine = %id, error = %cause, "failed to terminate machine");
                    let message = format!("failed to terminate {id}: {cause}");
                    self.emit(PoolEvent::alert(
                        TOPIC_RESIZE,
                        AlertSeverity::Error,
                        message.clone(),
                    ));
                    report.failures.push(message);
                }
                succeeded
            }
        };

        if terminated.is_empty() {
            return;
        }
        for id in &terminated {
            self.queue.remove(id);
        }
        info!(count = terminated.len(), machines = ?terminated, "terminated machines");
        self.pending.record_terminated(&terminated, Utc::now());
        self.emit(PoolEvent::MachinesTerminated {
            machines: terminated.clone(),
        });
        report.terminated.extend(terminated);
    }

    /// Look a machine up in the current pool
    async fn ensure_member(&mut self, machine_id: &str) -> Result<(), CoreError> {
        let pool = self.current_pool().await?;
        if pool.contains(machine_id) {
            Ok(())
        } else {
            Err(CoreError::MachineNotFound(machine_id.to_string()))
        }
    }
}

/// Periodically ask the controller to reconcile until shut down
async fn run_reconcile_loop(
    actor: WeakActorRef<PoolControllerActor>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(actor) = actor.upgrade() else {
            break;
        };
        match actor.ask(Reconcile).await {
            Ok(report) if report.has_failures() => {
                warn!(failures = ?report.failures, "reconciliation cycle partially failed");
            }
            Ok(_) => {}
            Err(SendError::HandlerError(CoreError::NotStarted | CoreError::NotConfigured)) => {
                break;
            }
            Err(e) => warn!(error = %e, "reconciliation cycle failed"),
        }
    }

    debug!("reconciliation loop stopped");
}

impl Actor for PoolControllerActor {
    type Args = PoolControllerArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "PoolControllerActor starting");

        let mut actor = Self {
            state: ControllerState::Unconfigured,
            configured: None,
            running: None,
            desired_size: None,
            queue: TerminationQueue::new(),
            pending: PendingActions::new(),
            last_reconciled: None,
            last_error: None,
            driver_factory: args.driver_factory,
            store: args.store,
            event_tx: args.event_tx,
            self_ref: actor_ref.downgrade(),
        };
        actor.restore_configuration().await;

        Ok(actor)
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "PoolControllerActor stopping");
        self.halt();
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Configure> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: Configure,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.apply_configuration(msg.config).await?;
        self.persist_configuration().await;
        Ok(())
    }
}

impl Message<GetConfiguration> for PoolControllerActor {
    type Reply = Result<PoolConfig, CoreError>;

    async fn handle(
        &mut self,
        _msg: GetConfiguration,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.config().map(|config| config.as_ref().clone())
    }
}

impl Message<Start> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, _msg: Start, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match self.state {
            ControllerState::Unconfigured => Err(CoreError::NotConfigured),
            ControllerState::Started => Ok(()),
            ControllerState::Stopped => self.launch().await,
        }
    }
}

impl Message<Stop> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(&mut self, _msg: Stop, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.state != ControllerState::Started {
            return Ok(());
        }
        self.halt();
        self.transition_to(ControllerState::Stopped)
    }
}

impl Message<GetStatus> for PoolControllerActor {
    type Reply = ControllerStatus;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        ControllerStatus {
            state: self.state,
            pool_name: self
                .configured
                .as_ref()
                .map(|configured| configured.config.name.clone()),
            desired_size: self.desired_size,
            scheduled_terminations: self.queue.iter().cloned().collect(),
            last_reconciled: self.last_reconciled,
            last_error: self.last_error.clone(),
        }
    }
}

impl Message<Reconcile> for PoolControllerActor {
    type Reply = Result<ReconcileReport, CoreError>;

    async fn handle(
        &mut self,
        _msg: Reconcile,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.reconcile().await
    }
}

impl Message<GetMachinePool> for PoolControllerActor {
    type Reply = Result<MachinePool, CoreError>;

    async fn handle(
        &mut self,
        _msg: GetMachinePool,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;
        self.current_pool().await
    }
}

impl Message<GetPoolSize> for PoolControllerActor {
    type Reply = Result<PoolSize, CoreError>;

    async fn handle(
        &mut self,
        _msg: GetPoolSize,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;
        let pool = self.current_pool().await?;
        let desired = self.desired_size.ok_or(CoreError::DesiredSizeUnknown)?;

        Ok(PoolSize {
            desired,
            allocated: pool.allocated_count(),
            effective: pool.effective_count(),
        })
    }
}

impl Message<SetDesiredSize> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: SetDesiredSize,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state == ControllerState::Unconfigured {
            return Err(CoreError::NotConfigured);
        }
        self.update_desired_size(msg.desired_size);
        Ok(())
    }
}

impl Message<TerminateMachine> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: TerminateMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;
        let id = msg.machine_id;
        self.ensure_member(&id).await?;

        let driver = self.driver()?;
        driver
            .terminate_machines(std::slice::from_ref(&id))
            .await
            .map_err(|e| match e.failures.get(&id).cloned() {
                Some(cause) => CoreError::for_machine(&id, cause),
                None => CoreError::TerminateMachines(e),
            })?;

        let was_scheduled = self.queue.remove(&id).is_some();
        info!(machine = %id, decrement_desired = msg.decrement_desired, "terminated machine");
        self.pending.record_terminated([&id], Utc::now());
        self.emit(PoolEvent::MachinesTerminated {
            machines: vec![id.clone()],
        });
        // A scheduled victim no longer counted towards the net size
        if msg.decrement_desired && !was_scheduled {
            self.decrement_desired_size();
        }

        self.refresh_after_change().await;
        Ok(())
    }
}

impl Message<AttachMachine> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: AttachMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;
        let id = msg.machine_id;

        self.driver()?
            .attach_machine(&id)
            .await
            .map_err(|e| CoreError::for_machine(&id, e))?;
        info!(machine = %id, "attached machine");

        if let Some(desired_size) = self.desired_size {
            self.update_desired_size(desired_size + 1);
        }

        self.refresh_after_change().await;
        Ok(())
    }
}

impl Message<DetachMachine> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: DetachMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;
        let id = msg.machine_id;
        self.ensure_member(&id).await?;

        self.driver()?
            .detach_machine(&id)
            .await
            .map_err(|e| CoreError::for_machine(&id, e))?;

        let was_scheduled = self.queue.remove(&id).is_some();
        info!(machine = %id, decrement_desired = msg.decrement_desired, "detached machine");
        self.pending.record_terminated([&id], Utc::now());
        if msg.decrement_desired && !was_scheduled {
            self.decrement_desired_size();
        }

        self.refresh_after_change().await;
        Ok(())
    }
}

impl Message<SetServiceState> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: SetServiceState,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;

        self.driver()?
            .set_service_state(&msg.machine_id, msg.service_state)
            .await
            .map_err(|e| CoreError::for_machine(&msg.machine_id, e))?;
        debug!(machine = %msg.machine_id, state = ?msg.service_state, "service state set");

        self.refresh_after_change().await;
        Ok(())
    }
}

impl Message<SetMembershipStatus> for PoolControllerActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: SetMembershipStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ensure_started()?;

        self.driver()?
            .set_membership_status(&msg.machine_id, msg.membership_status)
            .await
            .map_err(|e| CoreError::for_machine(&msg.machine_id, e))?;
        debug!(
            machine = %msg.machine_id,
            active = msg.membership_status.active,
            evictable = msg.membership_status.evictable,
            "membership status set"
        );

        self.refresh_after_change().await;
        Ok(())
    }
}
