// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Universal invariants over reconcile ticks.

use super::support::{cancel, Fleet};
use proptest::prelude::*;
use rf_core::test_support::{PlatformRunnerBuilder, VmBuilder};
use rf_core::{InstanceId, RunnersHealth};
use rf_engine::planner::{self, max_creation_time};
use rf_engine::{Action, Inventory};
use std::collections::BTreeSet;

#[tokio::test]
async fn tick_leaves_no_side_dangling() {
    let fleet = Fleet::new();
    fleet.healthy_pair("fleet-1", "1");
    // Dangling platform entry, orphaned VM, and a failed-creation VM.
    fleet
        .platform
        .insert_runner(PlatformRunnerBuilder::new("fleet-ghost").runner_id("9").build());
    fleet.cloud.insert_vm(VmBuilder::new("fleet-orphan").build());
    let reconciler = fleet.prespawn(1);

    reconciler.reconcile(&cancel()).await.unwrap();

    let vm_names: BTreeSet<String> = fleet.cloud.vm_names().into_iter().collect();
    let runner_names: BTreeSet<String> = fleet.platform.runner_names().into_iter().collect();
    assert_eq!(vm_names, runner_names, "every instance has both sides or neither");
}

#[tokio::test]
async fn two_unchanged_ticks_produce_zero_actions() {
    let fleet = Fleet::new();
    fleet.healthy_pair("fleet-1", "1");
    fleet.healthy_pair("fleet-2", "2");
    let reconciler = fleet.prespawn(2);

    let first = reconciler.reconcile(&cancel()).await.unwrap();
    let second = reconciler.reconcile(&cancel()).await.unwrap();

    for report in [first, second] {
        assert_eq!(report.action, Some(Action::Noop));
        assert!(report.deleted_runner_ids.is_empty());
        assert!(report.deleted_vm_ids.is_empty());
        assert!(report.spawned.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn reactive_success_observed_runner_and_job() {
    let fleet = Fleet::new();
    fleet
        .queue
        .push(r#"{"labels": ["x64"], "url": "https://github.com/acme/w/actions/runs/3"}"#);
    let reconciler = fleet.reactive(3, &["x64"]);

    // Make the job visible as soon as the runner registers.
    let platform = fleet.platform.clone();
    let watcher = tokio::spawn(async move {
        loop {
            let names = platform.registered_names();
            if let Some(name) = names.first() {
                platform.set_job(name, rf_adapters::JobInfo::default(), 0);
                break;
            }
            tokio::task::yield_now().await;
        }
    });

    let report = reconciler.reconcile(&cancel()).await.unwrap();
    watcher.await.unwrap();

    // Success implies the runner and its job were each observed at least
    // once; nothing was compensated away.
    assert_eq!(report.spawned.len(), 1);
    assert!(fleet.platform.deleted_ids().is_empty());
    assert_eq!(fleet.platform.runner_names().len(), 1);
}

fn arbitrary_health(names: Vec<(u8, bool, bool, bool)>) -> (Vec<rf_core::Vm>, RunnersHealth) {
    let mut vms = Vec::new();
    let mut health = RunnersHealth::default();
    for (index, (kind, online, busy, deletable)) in names.iter().enumerate() {
        let name = format!("fleet-{index}");
        let runner_id = format!("{index}");
        let runner = PlatformRunnerBuilder::new(&name)
            .runner_id(&runner_id)
            .online(*online)
            .busy(*busy)
            .deletable(*deletable)
            .build();
        match kind % 3 {
            // VM and platform record
            0 => {
                vms.push(VmBuilder::new(&name).runner_id(&runner_id).build());
                health.requested.push(runner);
            }
            // Platform record only
            1 => health.non_requested.push(runner),
            // VM only
            _ => vms.push(VmBuilder::new(&name).runner_id(&runner_id).build()),
        }
    }
    (vms, health)
}

proptest! {
    /// Inventory::build is a pure function: same inputs, same outputs.
    #[test]
    fn inventory_build_is_deterministic(
        states in proptest::collection::vec(
            (0u8..3, any::<bool>(), any::<bool>(), any::<bool>()),
            0..12,
        )
    ) {
        let (vms_a, health_a) = arbitrary_health(states.clone());
        let (vms_b, health_b) = arbitrary_health(states);
        prop_assert_eq!(Inventory::build(vms_a, health_a), Inventory::build(vms_b, health_b));
    }

    /// Deletion is a union: widening the runner delete set never removes a
    /// VM from the VM delete set.
    #[test]
    fn cleanup_is_monotone(
        states in proptest::collection::vec(
            (0u8..3, any::<bool>(), any::<bool>(), any::<bool>()),
            0..12,
        ),
        extra in 0usize..12,
    ) {
        let (vms, health) = arbitrary_health(states);
        let inventory = Inventory::build(vms, health);
        let now = rf_core::test_support::default_created_at();

        let plan = planner::plan(&inventory, max_creation_time(), now);
        let mut widened = plan.runner_ids.clone();
        widened.insert(format!("{extra}"));

        let vms_after = planner::vms_to_cleanup(&inventory, &widened);
        prop_assert!(vms_after.is_superset(&plan.vm_ids));
    }

    /// Spawned instance ids always carry the configured prefix and are
    /// never reused.
    #[test]
    fn instance_ids_are_prefixed_and_unique(count in 1usize..32) {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for _ in 0..count {
            let id = InstanceId::build("fleet", false);
            prop_assert!(id.as_str().starts_with("fleet-"));
            prop_assert!(seen.insert(id.as_str().to_string()), "id reused: {}", id);
        }
    }
}
