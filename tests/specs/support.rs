// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the workspace specs.

use rf_adapters::fake::{FakeCloud, FakePlatform};
use rf_adapters::MemoryQueue;
use rf_core::test_support::{default_created_at, PlatformRunnerBuilder, VmBuilder};
use rf_core::FakeClock;
use rf_engine::{
    FleetMetrics, MemorySink, PolicyConfig, PrespawnConfig, ReactiveConfig, ReconcileConfig,
    Reconciler,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type TestReconciler = Reconciler<FakePlatform, FakeCloud, MemoryQueue, MemorySink, FakeClock>;

pub struct Fleet {
    pub platform: FakePlatform,
    pub cloud: FakeCloud,
    pub queue: MemoryQueue,
    pub clock: FakeClock,
    pub sink: MemorySink,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            platform: FakePlatform::new(),
            cloud: FakeCloud::new("fleet"),
            queue: MemoryQueue::new(),
            clock: FakeClock::new(default_created_at()),
            sink: MemorySink::new(),
        }
    }

    pub fn prespawn(&self, base_quantity: usize) -> TestReconciler {
        self.reconciler(PolicyConfig::Prespawn(PrespawnConfig {
            base_quantity,
            vm_image: "noble".into(),
            vm_flavor: "m1.small".into(),
        }))
    }

    pub fn reactive(&self, base_quantity: usize, supported: &[&str]) -> TestReconciler {
        self.reconciler(PolicyConfig::Reactive(ReactiveConfig {
            base_quantity,
            vm_image: "noble".into(),
            vm_flavor: "m1.small".into(),
            supported_labels: supported.iter().map(|label| label.to_string()).collect(),
        }))
    }

    fn reconciler(&self, policy: PolicyConfig) -> TestReconciler {
        Reconciler::new(
            self.platform.clone(),
            self.cloud.clone(),
            Some(self.queue.clone()),
            policy,
            ReconcileConfig { manager_name: "fleet".into(), labels: vec!["x64".into()] },
            self.sink.clone(),
            Arc::new(FleetMetrics::new().expect("metrics registry")),
            self.clock.clone(),
        )
    }

    /// Seed a healthy, online VM + platform runner pair.
    pub fn healthy_pair(&self, name: &str, runner_id: &str) {
        self.cloud.insert_vm(VmBuilder::new(name).runner_id(runner_id).build());
        self.platform
            .insert_runner(PlatformRunnerBuilder::new(name).runner_id(runner_id).build());
    }
}

pub fn cancel() -> CancellationToken {
    CancellationToken::new()
}
