//! Resize planning
//!
//! [`ResizePlanner`] is a pure function of a pool snapshot, the termination
//! queue and the scale-in settings. Given a desired size it produces a
//! [`ResizePlan`] that either grows the pool, shrinks it, or does nothing.
//!
//! All sizing math counts effective members only. Out-of-service and
//! inactive machines are neither counted nor chosen as victims.

use chrono::{DateTime, Duration, Utc};
use poolwarden_api::{Machine, MachinePool, MachineState};
use serde::Serialize;
use tracing::debug;

use crate::billing::{BILLING_INTERVAL_SECS, next_billing_boundary};
use crate::error::PlanError;
use crate::termination::{ScheduledTermination, TerminationQueue};
use crate::victim::{VictimSelectionPolicy, VictimSelector};

/// Outcome of one planning step
///
/// A plan is a scale-out (`to_request`/`to_spare`), a scale-in
/// (`to_terminate`) or a no-op, never a mix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizePlan {
    to_request: usize,
    to_spare: usize,
    to_terminate: Vec<ScheduledTermination>,
}

impl ResizePlan {
    /// Build a plan, rejecting one that both grows and shrinks the pool
    pub fn new(
        to_request: usize,
        to_spare: usize,
        to_terminate: Vec<ScheduledTermination>,
    ) -> Result<Self, PlanError> {
        if (to_request > 0 || to_spare > 0) && !to_terminate.is_empty() {
            return Err(PlanError::AmbiguousPlan {
                to_request,
                to_spare,
                to_terminate: to_terminate.len(),
            });
        }
        Ok(Self {
            to_request,
            to_spare,
            to_terminate,
        })
    }

    #[must_use]
    pub fn noop() -> Self {
        Self {
            to_request: 0,
            to_spare: 0,
            to_terminate: Vec::new(),
        }
    }

    /// Machines to start
    #[must_use]
    pub fn to_request(&self) -> usize {
        self.to_request
    }

    /// Queued terminations to cancel
    #[must_use]
    pub fn to_spare(&self) -> usize {
        self.to_spare
    }

    /// Newly scheduled terminations
    #[must_use]
    pub fn to_terminate(&self) -> &[ScheduledTermination] {
        &self.to_terminate
    }

    #[must_use]
    pub fn into_terminations(self) -> Vec<ScheduledTermination> {
        self.to_terminate
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_request == 0 && self.to_spare == 0 && self.to_terminate.is_empty()
    }
}

/// Computes resize plans against one pool snapshot
#[derive(Debug)]
pub struct ResizePlanner<'a> {
    pool: &'a MachinePool,
    queue: &'a TerminationQueue,
    policy: VictimSelectionPolicy,
    instance_hour_margin: u64,
}

impl<'a> ResizePlanner<'a> {
    /// Create a planner
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidInstanceHourMargin` unless
    /// `instance_hour_margin_secs` is in `[0, 3600)`.
    pub fn new(
        pool: &'a MachinePool,
        queue: &'a TerminationQueue,
        policy: VictimSelectionPolicy,
        instance_hour_margin_secs: u64,
    ) -> Result<Self, PlanError> {
        if instance_hour_margin_secs >= BILLING_INTERVAL_SECS.unsigned_abs() {
            return Err(PlanError::InvalidInstanceHourMargin(
                instance_hour_margin_secs,
            ));
        }
        Ok(Self {
            pool,
            queue,
            policy,
            instance_hour_margin: instance_hour_margin_secs,
        })
    }

    /// Queued entries that are effective members of the pool
    #[must_use]
    pub fn scheduled_count(&self) -> usize {
        self.pool
            .effective_machines()
            .filter(|machine| self.queue.contains(&machine.id))
            .count()
    }

    /// Size the pool settles at once every queued termination has executed
    #[must_use]
    pub fn net_size(&self) -> usize {
        self.pool.effective_count() - self.scheduled_count()
    }

    pub fn calculate_resize_plan(&self, desired_size: usize) -> Result<ResizePlan, PlanError> {
        self.calculate_resize_plan_at(desired_size, Utc::now())
    }

    /// Plan towards `desired_size` as of `now`
    pub fn calculate_resize_plan_at(
        &self,
        desired_size: usize,
        now: DateTime<Utc>,
    ) -> Result<ResizePlan, PlanError> {
        let net_size = self.net_size();

        let plan = if desired_size > net_size {
            let missing = desired_size - net_size;
            let to_spare = self.scheduled_count().min(missing);
            ResizePlan::new(missing - to_spare, to_spare, Vec::new())?
        } else if desired_size < net_size {
            let terminations = self.scale_in(net_size - desired_size, now);
            ResizePlan::new(0, 0, terminations)?
        } else {
            ResizePlan::noop()
        };

        debug!(
            desired_size,
            net_size,
            to_request = plan.to_request(),
            to_spare = plan.to_spare(),
            to_terminate = plan.to_terminate().len(),
            "calculated resize plan"
        );
        Ok(plan)
    }

    fn scale_in(&self, excess: usize, now: DateTime<Utc>) -> Vec<ScheduledTermination> {
        let (requested, launched): (Vec<&Machine>, Vec<&Machine>) = self
            .pool
            .effective_machines()
            .filter(|machine| machine.is_evictable() && !self.queue.contains(&machine.id))
            .partition(|machine| machine.machine_state == MachineState::Requested);

        let selector = VictimSelector::new(self.policy, now);

        let mut terminations: Vec<ScheduledTermination> = selector
            .select(requested, self.queue, excess)
            .into_iter()
            .map(|machine| ScheduledTermination::new(machine, now))
            .collect();

        let remaining = excess - terminations.len();
        if remaining > 0 {
            terminations.extend(
                selector
                    .select(launched, self.queue, remaining)
                    .into_iter()
                    .map(|machine| {
                        let at = self.termination_time(&machine, now);
                        ScheduledTermination::new(machine, at)
                    }),
            );
        }

        terminations
    }

    /// Latest time a victim can run without starting another billed hour
    #[must_use]
    pub fn termination_time(&self, machine: &Machine, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.instance_hour_margin == 0 {
            return now;
        }
        let Some(launch_time) = machine.launch_time else {
            return now;
        };

        let margin = Duration::seconds(i64::try_from(self.instance_hour_margin).unwrap_or(0));
        let at = next_billing_boundary(launch_time, now) - margin;
        if at < now { now } else { at }
    }
}
