// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for tick orchestration.

use super::*;
use crate::pipeline::MemorySink;
use crate::planner::RUNNER_CREATION_WAITING_TIMES;
use rf_adapters::fake::{FakeCloud, FakePlatform};
use rf_adapters::MemoryQueue;
use rf_core::test_support::{default_created_at, PlatformRunnerBuilder, VmBuilder};
use rf_core::FakeClock;
use std::collections::BTreeSet;

struct Fixture {
    platform: FakePlatform,
    cloud: FakeCloud,
    queue: MemoryQueue,
    clock: FakeClock,
    sink: MemorySink,
}

impl Fixture {
    fn new() -> Self {
        Self {
            platform: FakePlatform::new(),
            cloud: FakeCloud::new("fleet"),
            queue: MemoryQueue::new(),
            clock: FakeClock::new(default_created_at()),
            sink: MemorySink::new(),
        }
    }

    fn prespawn(
        &self,
        base_quantity: usize,
    ) -> Reconciler<FakePlatform, FakeCloud, MemoryQueue, MemorySink, FakeClock> {
        self.reconciler(PolicyConfig::Prespawn(crate::policy::PrespawnConfig {
            base_quantity,
            vm_image: "noble".into(),
            vm_flavor: "m1.small".into(),
        }))
    }

    fn reactive(
        &self,
        base_quantity: usize,
        supported: &[&str],
    ) -> Reconciler<FakePlatform, FakeCloud, MemoryQueue, MemorySink, FakeClock> {
        self.reconciler(PolicyConfig::Reactive(crate::policy::ReactiveConfig {
            base_quantity,
            vm_image: "noble".into(),
            vm_flavor: "m1.small".into(),
            supported_labels: supported.iter().map(|label| label.to_string()).collect(),
        }))
    }

    fn reconciler(
        &self,
        policy: PolicyConfig,
    ) -> Reconciler<FakePlatform, FakeCloud, MemoryQueue, MemorySink, FakeClock> {
        let metrics = Arc::new(FleetMetrics::new().unwrap());
        Reconciler::new(
            self.platform.clone(),
            self.cloud.clone(),
            Some(self.queue.clone()),
            policy,
            ReconcileConfig { manager_name: "fleet".into(), labels: vec!["x64".into()] },
            self.sink.clone(),
            metrics,
            self.clock.clone(),
        )
    }

    /// Seed a healthy VM + online platform runner pair.
    fn healthy_pair(&self, name: &str, runner_id: &str) {
        self.cloud.insert_vm(VmBuilder::new(name).runner_id(runner_id).build());
        self.platform
            .insert_runner(PlatformRunnerBuilder::new(name).runner_id(runner_id).build());
    }
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn dangling_platform_runner_is_deleted() {
    let fixture = Fixture::new();
    fixture
        .platform
        .insert_runner(PlatformRunnerBuilder::new("fleet-x").runner_id("7").build());
    let reconciler = fixture.prespawn(0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.deleted_runner_ids, vec!["7".to_string()]);
    assert!(report.deleted_vm_ids.is_empty());
    assert!(report.spawned.is_empty());
}

#[tokio::test]
async fn stuck_creation_deletes_both_sides() {
    let fixture = Fixture::new();
    fixture.cloud.insert_vm(VmBuilder::new("fleet-1").runner_id("7").build());
    fixture.platform.insert_runner(
        PlatformRunnerBuilder::new("fleet-1").runner_id("7").online(false).build(),
    );
    fixture.clock.advance(max_creation_time() + std::time::Duration::from_secs(1));
    let reconciler = fixture.prespawn(0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.deleted_runner_ids, vec!["7".to_string()]);
    assert_eq!(report.deleted_vm_ids.len(), 1);
    assert_eq!(report.deleted_vm_ids[0].as_str(), "fleet-1");
}

#[tokio::test]
async fn prespawn_steady_state_is_a_noop() {
    let fixture = Fixture::new();
    fixture.healthy_pair("fleet-1", "1");
    fixture.healthy_pair("fleet-2", "2");
    let reconciler = fixture.prespawn(2);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.action, Some(Action::Noop));
    assert!(report.deleted_runner_ids.is_empty());
    assert!(report.deleted_vm_ids.is_empty());
    assert!(report.spawned.is_empty());
}

#[tokio::test]
async fn prespawn_scales_up_to_base_quantity() {
    let fixture = Fixture::new();
    fixture.healthy_pair("fleet-1", "1");
    let reconciler = fixture.prespawn(3);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.action, Some(Action::Create));
    assert_eq!(report.spawned.len(), 2);
    let names: BTreeSet<&str> = report.spawned.iter().map(|id| id.as_str()).collect();
    assert_eq!(names.len(), 2, "spawned instance ids must be distinct");
    for id in &report.spawned {
        assert!(id.as_str().starts_with("fleet-"));
        assert!(!id.is_reactive());
    }
    // Each spawn registered on the platform before VM creation.
    assert_eq!(fixture.platform.registered_names().len(), 2);
    assert_eq!(fixture.cloud.created().len(), 2);
}

#[tokio::test]
async fn prespawn_downscale_prefers_idle_and_deletes_vm() {
    let fixture = Fixture::new();
    fixture.healthy_pair("fleet-1", "1");
    fixture.healthy_pair("fleet-2", "2");
    fixture.healthy_pair("fleet-3", "3");
    fixture.platform.mark_busy("fleet-2");
    let reconciler = fixture.prespawn(2);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.action, Some(Action::Downscale(1)));
    // An idle runner went, the busy one stayed.
    assert_eq!(report.deleted_runner_ids.len(), 1);
    assert_ne!(report.deleted_runner_ids[0], "2");
    assert_eq!(report.deleted_vm_ids.len(), 1);
}

#[tokio::test]
async fn downscale_busy_refusal_keeps_the_vm() {
    let fixture = Fixture::new();
    fixture.healthy_pair("fleet-1", "1");
    fixture.platform.mark_busy("fleet-1");
    let reconciler = fixture.prespawn(0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    // The platform refused the busy runner; its VM must survive.
    assert_eq!(report.action, Some(Action::Downscale(1)));
    assert!(report.deleted_runner_ids.is_empty());
    assert!(report.deleted_vm_ids.is_empty());
    assert_eq!(fixture.cloud.vm_names(), vec!["fleet-1".to_string()]);
}

#[tokio::test]
async fn two_unchanged_ticks_are_idempotent() {
    let fixture = Fixture::new();
    fixture.healthy_pair("fleet-1", "1");
    fixture.healthy_pair("fleet-2", "2");
    let reconciler = fixture.prespawn(2);

    for _ in 0..2 {
        let report = reconciler.reconcile(&cancel()).await.unwrap();
        assert_eq!(report.action, Some(Action::Noop));
        assert!(report.deleted_runner_ids.is_empty());
        assert!(report.deleted_vm_ids.is_empty());
        assert!(report.spawned.is_empty());
    }
}

#[tokio::test]
async fn after_tick_no_side_is_dangling() {
    let fixture = Fixture::new();
    // One healthy pair, one dangling platform entry, one orphaned VM that
    // never registered.
    fixture.healthy_pair("fleet-1", "1");
    fixture
        .platform
        .insert_runner(PlatformRunnerBuilder::new("fleet-ghost").runner_id("9").build());
    fixture.cloud.insert_vm(VmBuilder::new("fleet-orphan").build());
    let reconciler = fixture.prespawn(1);

    reconciler.reconcile(&cancel()).await.unwrap();

    // Every surviving instance has both a VM and a platform runner.
    let vm_names: BTreeSet<String> = fixture.cloud.vm_names().into_iter().collect();
    let runner_names: BTreeSet<String> =
        fixture.platform.runner_names().into_iter().collect();
    assert_eq!(vm_names, runner_names);
    assert_eq!(vm_names, BTreeSet::from(["fleet-1".to_string()]));
}

#[tokio::test]
async fn metrics_are_extracted_before_deletion_and_events_issued() {
    let fixture = Fixture::new();
    // A deletable pair with metric files on the VM.
    fixture.cloud.insert_vm(VmBuilder::new("fleet-1").runner_id("7").build());
    fixture.platform.insert_runner(
        PlatformRunnerBuilder::new("fleet-1").runner_id("7").deletable(true).build(),
    );
    let created = default_created_at().timestamp() as f64;
    fixture.cloud.set_ssh_files(
        "fleet-1",
        &[
            (crate::extract::RUNNER_INSTALLED_TS_FILE, format!("{}", created + 42.0).as_bytes()),
            (
                crate::extract::PRE_JOB_METRICS_FILE,
                format!(
                    r#"{{"timestamp": {}, "workflow": "build", "repository": "acme/widgets", "event": "push"}}"#,
                    created + 60.0
                )
                .as_bytes(),
            ),
            (
                crate::extract::POST_JOB_METRICS_FILE,
                format!(r#"{{"timestamp": {}, "status": "normal"}}"#, created + 120.0).as_bytes(),
            ),
        ],
    );
    let reconciler = fixture.prespawn(0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.deleted_vm_ids.len(), 1);
    assert_eq!(report.events_issued, 3);
    let names: Vec<&str> = fixture.sink.events().iter().map(|event| event.name()).collect();
    assert_eq!(names, vec!["runner_installed", "runner_start", "runner_stop"]);
}

#[tokio::test(start_paused = true)]
async fn reactive_tick_spawns_from_queue() {
    let fixture = Fixture::new();
    fixture.queue.push(
        r#"{"labels": ["x64"], "url": "https://github.com/acme/widgets/actions/runs/7"}"#,
    );
    let reconciler = fixture.reactive(5, &["x64"]);

    // The runner registers, comes up, and picks its job up immediately.
    let report = {
        let platform = fixture.platform.clone();
        let handle = tokio::spawn(async move {
            // Let registration happen, then make the job visible.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            for name in platform.runner_names() {
                platform.set_job(&name, rf_adapters::JobInfo::default(), 0);
            }
        });
        let report = reconciler.reconcile(&cancel()).await.unwrap();
        handle.await.unwrap();
        report
    };

    assert_eq!(report.action, Some(Action::Create));
    assert_eq!(report.spawned.len(), 1);
    assert!(report.spawned[0].is_reactive());
    assert_eq!(fixture.queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn reactive_malformed_message_is_dropped_without_spawn() {
    let fixture = Fixture::new();
    fixture.queue.push("{");
    let reconciler = fixture.reactive(5, &["x64"]);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.spawned.len(), 0);
    assert_eq!(fixture.queue.size().await.unwrap(), 0);
    assert_eq!(fixture.queue.unacked_len(), 0);
    assert!(fixture.cloud.created().is_empty());
}

#[tokio::test]
async fn reactive_unsupported_label_is_dropped_without_spawn() {
    let fixture = Fixture::new();
    fixture
        .queue
        .push(r#"{"labels": ["arm64"], "url": "https://github.com/acme/w/actions/runs/7"}"#);
    let reconciler = fixture.reactive(5, &["x64"]);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.spawned.len(), 0);
    assert_eq!(fixture.queue.size().await.unwrap(), 0);
    assert!(fixture.platform.registered_names().is_empty());
}

#[tokio::test]
async fn auth_error_fails_the_tick() {
    let fixture = Fixture::new();
    fixture.platform.set_auth_failure();
    let reconciler = fixture.prespawn(1);

    let result = reconciler.reconcile(&cancel()).await;
    assert!(matches!(result, Err(ReconcileError::Auth(_))));
}

#[tokio::test]
async fn cancelled_token_stops_the_tick_between_stages() {
    let fixture = Fixture::new();
    fixture.healthy_pair("fleet-1", "1");
    let token = CancellationToken::new();
    token.cancel();
    let reconciler = fixture.prespawn(1);

    let result = reconciler.reconcile(&token).await;
    assert!(matches!(result, Err(ReconcileError::Cancelled)));
}

#[tokio::test]
async fn wait_ladder_matches_the_documented_schedule() {
    // Five health checks at 60, 60, 120, 240, 480 seconds.
    let total: std::time::Duration = RUNNER_CREATION_WAITING_TIMES.iter().sum();
    assert_eq!(total, std::time::Duration::from_secs(960));
}
