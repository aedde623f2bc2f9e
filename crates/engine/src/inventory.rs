// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Joint view of cloud VMs and platform runners.
//!
//! [`Inventory::build`] is a pure function: no I/O, no clock. Same inputs
//! yield identical outputs.

use rf_core::{InstanceId, PlatformRunner, RunnerIdentity, RunnersHealth, Vm};
use std::collections::{BTreeMap, BTreeSet};

/// Classified state for one reconcile tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    /// Every VM under the prefix, keyed by instance ID.
    pub vms: BTreeMap<InstanceId, Vm>,
    /// Platform records for VMs we asked about.
    pub requested: BTreeMap<InstanceId, PlatformRunner>,
    /// Platform records with no matching VM.
    pub dangling: BTreeMap<InstanceId, PlatformRunner>,
    /// Asked-for runners the platform returned no data for (transient).
    pub failed: BTreeMap<InstanceId, RunnerIdentity>,

    /// Platform runner IDs the platform marked deletable.
    pub deletable: BTreeSet<String>,
    /// Platform runner IDs reported offline and idle.
    pub offline_idle: BTreeSet<String>,
    /// Platform runner IDs reported online and idle.
    pub online_idle: BTreeSet<String>,
    /// Platform runner IDs reported online and busy.
    pub online_busy: BTreeSet<String>,
}

impl Inventory {
    pub fn build(vms: Vec<Vm>, health: RunnersHealth) -> Self {
        let mut inventory = Inventory::default();
        for vm in vms {
            inventory.vms.insert(vm.instance_id.clone(), vm);
        }

        for runner in health.requested {
            let id = runner.identity.instance_id.clone();
            if inventory.vms.contains_key(&id) {
                inventory.classify(&runner);
                inventory.requested.insert(id, runner);
            } else {
                inventory.dangling.insert(id, runner);
            }
        }
        for runner in health.non_requested {
            let id = runner.identity.instance_id.clone();
            inventory.dangling.insert(id, runner);
        }
        for identity in health.failed {
            inventory.failed.insert(identity.instance_id.clone(), identity);
        }
        inventory
    }

    fn classify(&mut self, runner: &PlatformRunner) {
        let Some(runner_id) = runner.runner_id() else {
            return;
        };
        if runner.deletable {
            self.deletable.insert(runner_id.to_string());
        }
        if runner.is_offline_idle() {
            self.offline_idle.insert(runner_id.to_string());
        } else if runner.is_online_idle() {
            self.online_idle.insert(runner_id.to_string());
        } else if runner.online && runner.busy {
            self.online_busy.insert(runner_id.to_string());
        }
    }

    /// The VM paired with a requested platform runner, if any.
    pub fn vm_for(&self, id: &InstanceId) -> Option<&Vm> {
        self.vms.get(id)
    }
}

#[cfg(test)]
#[path = "inventory_tests.rs"]
mod tests;
