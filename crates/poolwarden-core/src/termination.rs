//! Scheduled terminations
//!
//! Machines chosen for scale-in are not terminated right away. They wait in
//! the [`TerminationQueue`] until their termination time, which usually sits
//! just before the end of a paid instance hour. While queued, a machine no
//! longer counts towards the net pool size, and a later scale-out can
//! "spare" it instead of starting a new machine.

use chrono::{DateTime, Utc};
use poolwarden_api::Machine;
use serde::{Deserialize, Serialize};

/// A machine paired with the time it should be terminated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTermination {
    pub machine: Machine,
    pub termination_time: DateTime<Utc>,
}

impl ScheduledTermination {
    pub fn new(machine: Machine, termination_time: DateTime<Utc>) -> Self {
        Self {
            machine,
            termination_time,
        }
    }

    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine.id
    }

    /// Whether the termination time has been reached
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.termination_time <= now
    }
}

/// Machines awaiting termination, at most one entry per machine id
#[derive(Debug, Clone, Default)]
pub struct TerminationQueue {
    entries: Vec<ScheduledTermination>,
}

impl TerminationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any existing entry for the same machine
    ///
    /// Returns `true` when the machine was not queued before.
    pub fn insert(&mut self, entry: ScheduledTermination) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.machine.id == entry.machine.id)
        {
            Some(existing) => {
                *existing = entry;
                false
            }
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    /// Remove the entry for `machine_id`, if any
    pub fn remove(&mut self, machine_id: &str) -> Option<ScheduledTermination> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.machine.id == machine_id)?;
        Some(self.entries.remove(index))
    }

    #[must_use]
    pub fn contains(&self, machine_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.machine.id == machine_id)
    }

    #[must_use]
    pub fn get(&self, machine_id: &str) -> Option<&ScheduledTermination> {
        self.entries.iter().find(|entry| entry.machine.id == machine_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledTermination> {
        self.entries.iter()
    }

    /// Entries whose termination time is at or before `now`, in queue order
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledTermination> {
        self.entries
            .iter()
            .filter(|entry| entry.is_due(now))
            .cloned()
            .collect()
    }

    /// Take up to `count` entries off the queue, latest termination time first
    ///
    /// Sparing the machines furthest from termination keeps the ones about to
    /// cross a billing boundary on their way out.
    pub fn spare(&mut self, count: usize) -> Vec<ScheduledTermination> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            self.entries[b]
                .termination_time
                .cmp(&self.entries[a].termination_time)
                .then(b.cmp(&a))
        });
        let mut chosen: Vec<usize> = order.into_iter().take(count).collect();

        // Remove from the back so earlier indices stay valid
        chosen.sort_unstable_by(|a, b| b.cmp(a));
        let mut spared: Vec<ScheduledTermination> = chosen
            .into_iter()
            .map(|index| self.entries.remove(index))
            .collect();
        spared.sort_by(|a, b| b.termination_time.cmp(&a.termination_time));
        spared
    }

    /// Keep only the entries for which `keep` returns `true`, returning the rest
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<ScheduledTermination>
    where
        F: FnMut(&ScheduledTermination) -> bool,
    {
        let (kept, dropped) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| keep(entry));
        self.entries = kept;
        dropped
    }
}
