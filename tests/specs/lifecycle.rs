// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end lifecycle through the cloud layer: keypair coupling, prefix
//! isolation, and key-file garbage collection.

use super::support::cancel;
use rf_adapters::fake::{FakeCompute, FakePlatform, FakeSshFactory};
use rf_adapters::openstack::{keys::KeyStore, OpenStackCloud};
use rf_adapters::MemoryQueue;
use rf_core::test_support::default_created_at;
use rf_core::FakeClock;
use rf_engine::{
    FleetMetrics, MemorySink, PolicyConfig, PrespawnConfig, ReconcileConfig, Reconciler,
};
use std::sync::Arc;

type CloudReconciler =
    Reconciler<FakePlatform, OpenStackCloud<FakeCompute, FakeSshFactory>, MemoryQueue, MemorySink, FakeClock>;

fn reconciler(
    platform: FakePlatform,
    api: FakeCompute,
    key_dir: &std::path::Path,
    base_quantity: usize,
) -> CloudReconciler {
    let cloud = OpenStackCloud::new(
        api,
        FakeSshFactory::new(),
        KeyStore::new(key_dir),
        "fleet",
        "runner-net",
    );
    Reconciler::new(
        platform,
        cloud,
        None,
        PolicyConfig::Prespawn(PrespawnConfig {
            base_quantity,
            vm_image: "noble".into(),
            vm_flavor: "m1.small".into(),
        }),
        ReconcileConfig { manager_name: "fleet".into(), labels: vec!["x64".into()] },
        MemorySink::new(),
        Arc::new(FleetMetrics::new().expect("metrics registry")),
        FakeClock::new(default_created_at()),
    )
}

#[tokio::test]
async fn spawned_vms_are_prefixed_with_one_keypair_each() {
    let platform = FakePlatform::new();
    let api = FakeCompute::new();
    api.set_created_at(default_created_at());
    let dir = tempfile::tempdir().unwrap();
    let reconciler = reconciler(platform, api.clone(), dir.path(), 2);

    let report = reconciler.reconcile(&cancel()).await.unwrap();
    assert_eq!(report.spawned.len(), 2);

    let servers = api.servers();
    assert_eq!(servers.len(), 2);
    let mut keypairs = api.keypair_names();
    keypairs.sort();
    let mut server_names: Vec<String> = servers.iter().map(|s| s.name.clone()).collect();
    server_names.sort();
    // Exactly one keypair per VM, named after the instance.
    assert_eq!(keypairs, server_names);

    for name in &server_names {
        assert!(name.starts_with("fleet-"));
        let key_path = dir.path().join(format!("{name}.key"));
        assert!(key_path.exists(), "missing key file for {name}");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o400, "key file for {name} must be owner-read-only");
        }
    }
}

#[tokio::test]
async fn foreign_resources_are_never_touched() {
    let platform = FakePlatform::new();
    let api = FakeCompute::new();
    api.set_created_at(default_created_at());
    // A server and keypair owned by another application.
    api.add_named_server("other-app-1");
    api.add_keypair("other-app-1");
    let dir = tempfile::tempdir().unwrap();
    let reconciler = reconciler(platform, api.clone(), dir.path(), 0);

    let report = reconciler.reconcile(&cancel()).await.unwrap();

    assert!(report.deleted_vm_ids.is_empty());
    assert_eq!(api.servers().len(), 1);
    assert!(api.keypair_names().contains(&"other-app-1".to_string()));
}

#[tokio::test]
async fn deleting_the_fleet_reaps_keypairs_and_key_files() {
    let platform = FakePlatform::new();
    let api = FakeCompute::new();
    api.set_created_at(default_created_at());
    let dir = tempfile::tempdir().unwrap();

    // Tick 1: bring up one runner.
    let up = reconciler(platform.clone(), api.clone(), dir.path(), 1);
    let report = up.reconcile(&cancel()).await.unwrap();
    assert_eq!(report.spawned.len(), 1);
    let name = api.servers()[0].name.clone();
    assert!(dir.path().join(format!("{name}.key")).exists());

    // Tick 2: scale to zero; the runner is online-idle, so downscale picks
    // it, and the cloud layer deletes server, keypair, and key file.
    platform.mark_online(&name);
    let down = reconciler(platform.clone(), api.clone(), dir.path(), 0);
    let report = down.reconcile(&cancel()).await.unwrap();

    assert_eq!(report.deleted_runner_ids.len(), 1);
    assert_eq!(report.deleted_vm_ids.len(), 1);
    assert!(api.servers().is_empty());
    assert!(api.keypair_names().is_empty());
    assert!(!dir.path().join(format!("{name}.key")).exists());
    assert!(platform.runner_names().is_empty());
}
