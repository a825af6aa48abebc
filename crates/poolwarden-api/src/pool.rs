//! Machine pool snapshots

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::Machine;

/// Immutable snapshot of a pool's machines at a point in time
///
/// Snapshots are never edited; a newer snapshot replaces an older one
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachinePool {
    machines: Vec<Machine>,
    timestamp: DateTime<Utc>,
}

impl MachinePool {
    /// Create a snapshot
    #[must_use]
    pub fn new(machines: Vec<Machine>, timestamp: DateTime<Utc>) -> Self {
        Self {
            machines,
            timestamp,
        }
    }

    /// Snapshot with no machines
    #[must_use]
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), timestamp)
    }

    /// All machines, including terminal ones
    #[must_use]
    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// When the snapshot was taken
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Age of the snapshot relative to `now`
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Look up a machine by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Machines in a non-terminal state
    pub fn allocated_machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(|m| m.is_allocated())
    }

    /// Machines counted towards the pool size
    pub fn effective_machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(|m| m.is_effective_member())
    }

    /// Allocated machines marked out-of-service
    pub fn out_of_service_machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines
            .iter()
            .filter(|m| m.is_allocated() && m.is_out_of_service())
    }

    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.allocated_machines().count()
    }

    #[must_use]
    pub fn effective_count(&self) -> usize {
        self.effective_machines().count()
    }
}

/// Size summary of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSize {
    /// Size the pool is converging to
    pub desired: usize,
    /// Machines in a non-terminal state
    pub allocated: usize,
    /// Machines counted towards the pool size
    pub effective: usize,
}
