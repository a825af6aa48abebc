//! Scale-in victim selection

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use poolwarden_api::Machine;
use serde::{Deserialize, Serialize};

use crate::billing::remaining_billing_time;
use crate::termination::TerminationQueue;

/// Order in which machines are picked for termination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictimSelectionPolicy {
    /// Earliest launch time first
    #[default]
    OldestInstance,
    /// Latest launch time first
    NewestInstance,
    /// Least time remaining in the current billing hour first
    ClosestToInstanceHour,
}

impl VictimSelectionPolicy {
    /// Compare two machines so that the preferred victim sorts first
    ///
    /// Machines without a launch time count as the newest and as having no
    /// billed time left. Ties are broken by machine id.
    #[must_use]
    pub fn compare(self, a: &Machine, b: &Machine, now: DateTime<Utc>) -> Ordering {
        let by_policy = match self {
            VictimSelectionPolicy::OldestInstance => match (a.launch_time, b.launch_time) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            VictimSelectionPolicy::NewestInstance => match (a.launch_time, b.launch_time) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            },
            VictimSelectionPolicy::ClosestToInstanceHour => {
                let remaining = |m: &Machine| {
                    m.launch_time
                        .map(|launched| remaining_billing_time(launched, now))
                        .unwrap_or_else(chrono::Duration::zero)
                };
                remaining(a).cmp(&remaining(b))
            }
        };
        by_policy.then_with(|| a.id.cmp(&b.id))
    }
}

impl std::fmt::Display for VictimSelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VictimSelectionPolicy::OldestInstance => write!(f, "oldest_instance"),
            VictimSelectionPolicy::NewestInstance => write!(f, "newest_instance"),
            VictimSelectionPolicy::ClosestToInstanceHour => write!(f, "closest_to_instance_hour"),
        }
    }
}

/// Picks scale-in victims according to a policy
#[derive(Debug, Clone, Copy)]
pub struct VictimSelector {
    policy: VictimSelectionPolicy,
    now: DateTime<Utc>,
}

impl VictimSelector {
    pub fn new(policy: VictimSelectionPolicy, now: DateTime<Utc>) -> Self {
        Self { policy, now }
    }

    /// Choose up to `count` machines from `candidates`, skipping queued ones
    ///
    /// Returns fewer than `count` when not enough candidates remain.
    #[must_use]
    pub fn select<'a, I>(&self, candidates: I, queue: &TerminationQueue, count: usize) -> Vec<Machine>
    where
        I: IntoIterator<Item = &'a Machine>,
    {
        let mut eligible: Vec<&Machine> = candidates
            .into_iter()
            .filter(|machine| !queue.contains(&machine.id))
            .collect();
        eligible.sort_by(|a, b| self.policy.compare(a, b, self.now));
        eligible.into_iter().take(count).cloned().collect()
    }
}
