//! Recent actions not yet visible in pool snapshots
//!
//! The cached snapshot can predate machines the controller just started or
//! terminated. Without correction the next cycle would start or terminate
//! them again. `PendingActions` layers those actions onto any snapshot taken
//! before they happened, and forgets each one once a newer snapshot arrives.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use poolwarden_api::{Machine, MachinePool, MachineState};

#[derive(Debug, Default)]
pub struct PendingActions {
    started: Vec<(Machine, DateTime<Utc>)>,
    terminated: HashMap<String, DateTime<Utc>>,
}

impl PendingActions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&mut self, machines: impl IntoIterator<Item = Machine>, at: DateTime<Utc>) {
        for machine in machines {
            self.terminated.remove(&machine.id);
            self.started.retain(|(existing, _)| existing.id != machine.id);
            self.started.push((machine, at));
        }
    }

    pub fn record_terminated<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a String>,
        at: DateTime<Utc>,
    ) {
        for id in ids {
            self.started.retain(|(machine, _)| &machine.id != id);
            self.terminated.insert(id.clone(), at);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.terminated.is_empty()
    }

    /// Overlay pending actions onto `pool`
    ///
    /// Actions recorded before the snapshot was taken are already reflected
    /// in it and are dropped.
    pub fn apply(&mut self, pool: MachinePool) -> MachinePool {
        let taken_at = pool.timestamp();
        self.started.retain(|(_, at)| *at >= taken_at);
        self.terminated.retain(|_, at| *at >= taken_at);

        if self.is_empty() {
            return pool;
        }

        let mut machines: Vec<Machine> = pool
            .machines()
            .iter()
            .map(|machine| {
                if self.terminated.contains_key(&machine.id) && machine.is_allocated() {
                    let mut machine = machine.clone();
                    machine.machine_state = MachineState::Terminating;
                    machine
                } else {
                    machine.clone()
                }
            })
            .collect();

        for (machine, _) in &self.started {
            if !pool.contains(&machine.id) {
                machines.push(machine.clone());
            }
        }

        MachinePool::new(machines, taken_at)
    }
}
