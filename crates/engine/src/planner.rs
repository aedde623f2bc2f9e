// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cleanup planning: which platform runners and VMs die this tick.
//!
//! Deletion is a union: adding a platform runner to the delete set never
//! removes a VM from it and vice versa. The planner itself performs no I/O.

use crate::inventory::Inventory;
use chrono::{DateTime, Utc};
use rf_core::{InstanceId, PlatformRunner};
use std::collections::BTreeSet;
use std::time::Duration;

/// Wait ladder applied after runner creation; one health check per entry.
pub const RUNNER_CREATION_WAITING_TIMES: [Duration; 5] = [
    Duration::from_secs(60),
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(240),
    Duration::from_secs(480),
];

const CREATION_SAFETY_MARGIN: Duration = Duration::from_secs(120);

/// Wall-clock bound on runner creation: the VM create timeout, every
/// health-check wait, and a safety margin. A VM younger than this is never
/// deleted just because the platform has not seen it yet.
pub fn max_creation_time() -> Duration {
    let waits: Duration = RUNNER_CREATION_WAITING_TIMES.iter().sum();
    rf_adapters::openstack::CREATE_SERVER_TIMEOUT + waits + CREATION_SAFETY_MARGIN
}

/// Strategy for flushing runners outside the normal cleanup rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Flush online-idle runners only.
    Idle,
    /// Flush busy runners as well.
    Busy,
}

/// The sets to delete this tick, with the classification counts that fed
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    pub runner_ids: BTreeSet<String>,
    pub vm_ids: BTreeSet<InstanceId>,
    pub dangling: usize,
    pub timed_out: usize,
}

/// Compute the cleanup sets for an inventory.
///
/// A platform runner is deleted when it is dangling, when the platform
/// marked it deletable, or when its VM outlived `max_creation` while the
/// platform still reports it offline and idle. A VM is deleted when its
/// metadata never received a runner ID or when its runner is in the delete
/// set.
pub fn plan(inventory: &Inventory, max_creation: Duration, now: DateTime<Utc>) -> CleanupPlan {
    let dangling_runners: BTreeSet<String> = inventory
        .dangling
        .values()
        .filter_map(|runner| runner.runner_id().map(str::to_string))
        .collect();

    let timed_out_offline_idle: BTreeSet<String> = inventory
        .requested
        .iter()
        .filter(|(id, runner)| {
            runner.is_offline_idle()
                && inventory
                    .vm_for(id)
                    .is_some_and(|vm| vm.is_older_than(max_creation, now))
        })
        .filter_map(|(_, runner)| runner.runner_id().map(str::to_string))
        .collect();

    let mut runner_ids = dangling_runners.clone();
    runner_ids.extend(inventory.deletable.iter().cloned());
    runner_ids.extend(timed_out_offline_idle.iter().cloned());

    CleanupPlan {
        vm_ids: vms_to_cleanup(inventory, &runner_ids),
        dangling: dangling_runners.len(),
        timed_out: timed_out_offline_idle.len(),
        runner_ids,
    }
}

/// VMs whose platform runner is in `runner_ids`, plus VMs that never
/// completed registration.
pub fn vms_to_cleanup(inventory: &Inventory, runner_ids: &BTreeSet<String>) -> BTreeSet<InstanceId> {
    inventory
        .vms
        .values()
        .filter(|vm| match vm.metadata.runner_id.as_deref() {
            None => true,
            Some(runner_id) => runner_ids.contains(runner_id),
        })
        .map(|vm| vm.instance_id.clone())
        .collect()
}

/// Pick `n` runners to scale down, preferring deletable over idle over
/// busy. Busy runners are attempted; the platform may refuse them.
pub fn select_downscale<'a, I>(candidates: I, n: usize) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a PlatformRunner>,
{
    let mut ranked: Vec<&PlatformRunner> = candidates.into_iter().collect();
    ranked.sort_by_key(|runner| {
        if runner.deletable {
            1
        } else if !runner.busy {
            2
        } else {
            3
        }
    });
    ranked
        .into_iter()
        .take(n)
        .filter_map(|runner| runner.runner_id().map(str::to_string))
        .collect()
}

/// Runner IDs targeted by a flush.
pub fn select_flush(inventory: &Inventory, mode: FlushMode) -> BTreeSet<String> {
    let mut ids = inventory.online_idle.clone();
    if mode == FlushMode::Busy {
        ids.extend(inventory.online_busy.iter().cloned());
    }
    ids
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
