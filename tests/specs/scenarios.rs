// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete reconcile scenarios.

use super::support::{cancel, Fleet};
use rf_adapters::JobQueue;
use rf_core::test_support::{PlatformRunnerBuilder, VmBuilder};
use rf_engine::{planner::max_creation_time, Action};
use std::time::Duration;

#[tokio::test]
async fn dangling_platform_runner_is_reaped_alone() {
    let fleet = Fleet::new();
    fleet
        .platform
        .insert_runner(PlatformRunnerBuilder::new("fleet-x").runner_id("7").build());
    let reconciler = fleet.prespawn(0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.deleted_runner_ids, vec!["7".to_string()]);
    assert!(report.deleted_vm_ids.is_empty());
    assert!(report.spawned.is_empty());
    assert!(fleet.platform.runner_names().is_empty());
}

#[tokio::test]
async fn stuck_creation_deletes_runner_and_vm() {
    let fleet = Fleet::new();
    fleet.cloud.insert_vm(VmBuilder::new("fleet-x").runner_id("7").build());
    fleet.platform.insert_runner(
        PlatformRunnerBuilder::new("fleet-x").runner_id("7").online(false).build(),
    );
    fleet.clock.advance(max_creation_time() + Duration::from_secs(1));
    let reconciler = fleet.prespawn(0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.deleted_runner_ids, vec!["7".to_string()]);
    assert_eq!(report.deleted_vm_ids.len(), 1);
    assert!(fleet.cloud.vm_names().is_empty());
    assert!(fleet.platform.runner_names().is_empty());
}

#[tokio::test]
async fn prespawn_steady_state_changes_nothing() {
    let fleet = Fleet::new();
    fleet.healthy_pair("fleet-1", "1");
    fleet.healthy_pair("fleet-2", "2");
    let reconciler = fleet.prespawn(2);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.action, Some(Action::Noop));
    assert!(report.deleted_runner_ids.is_empty());
    assert!(report.deleted_vm_ids.is_empty());
    assert!(report.spawned.is_empty());
}

#[tokio::test]
async fn prespawn_scale_up_spawns_distinct_prefixed_runners() {
    let fleet = Fleet::new();
    fleet.healthy_pair("fleet-1", "1");
    let reconciler = fleet.prespawn(3);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.action, Some(Action::Create));
    assert_eq!(report.spawned.len(), 2);
    let mut names: Vec<&str> = report.spawned.iter().map(|id| id.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 2, "instance ids must be distinct");
    for name in names {
        assert!(name.starts_with("fleet-"));
    }
    assert_eq!(fleet.cloud.vm_names().len(), 3);
}

#[tokio::test]
async fn reactive_malformed_message_is_dropped_for_good() {
    let fleet = Fleet::new();
    fleet.queue.push("{");
    let reconciler = fleet.reactive(5, &["x64"]);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert!(report.spawned.is_empty());
    // Rejected without requeue: the queue drains to zero.
    assert_eq!(fleet.queue.size().await.unwrap(), 0);
    assert_eq!(fleet.queue.unacked_len(), 0);
    assert!(fleet.cloud.created().is_empty());
    assert!(fleet.platform.registered_names().is_empty());
}

#[tokio::test]
async fn reactive_unsupported_label_is_dropped_without_registration() {
    let fleet = Fleet::new();
    fleet
        .queue
        .push(r#"{"labels": ["arm64"], "url": "https://github.com/acme/w/actions/runs/9"}"#);
    let reconciler = fleet.reactive(5, &["x64"]);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert!(report.spawned.is_empty());
    assert_eq!(fleet.queue.size().await.unwrap(), 0);
    // The upstream job was never touched: no runner registered for it.
    assert!(fleet.platform.registered_names().is_empty());
    assert!(fleet.cloud.created().is_empty());
}
