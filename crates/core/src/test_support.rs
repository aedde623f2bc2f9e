// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and helpers for tests in this crate and downstream crates.

use crate::id::InstanceId;
use crate::metadata::{RunnerIdentity, RunnerMetadata};
use crate::runner::PlatformRunner;
use crate::vm::{Vm, VmState};
use chrono::{DateTime, TimeZone, Utc};

/// A fixed creation timestamp so tests are deterministic.
pub fn default_created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_default()
}

/// Identity for a raw instance name with default metadata.
pub fn identity(name: &str) -> RunnerIdentity {
    RunnerIdentity::new(InstanceId::from_full_name(name), RunnerMetadata::default())
}

/// Builder for [`Vm`] records in tests.
pub struct VmBuilder {
    vm: Vm,
}

impl VmBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            vm: Vm {
                instance_id: InstanceId::from_full_name(name),
                metadata: RunnerMetadata::default(),
                created_at: default_created_at(),
                state: VmState::Active,
                addresses: vec!["10.0.0.5".into()],
                server_id: format!("srv-{name}"),
            },
        }
    }

    pub fn runner_id(mut self, runner_id: &str) -> Self {
        self.vm.metadata.runner_id = Some(runner_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: RunnerMetadata) -> Self {
        self.vm.metadata = metadata;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.vm.created_at = created_at;
        self
    }

    pub fn state(mut self, state: VmState) -> Self {
        self.vm.state = state;
        self
    }

    pub fn addresses(mut self, addresses: &[&str]) -> Self {
        self.vm.addresses = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn build(self) -> Vm {
        self.vm
    }
}

/// Builder for [`PlatformRunner`] records in tests.
pub struct PlatformRunnerBuilder {
    runner: PlatformRunner,
}

impl PlatformRunnerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            runner: PlatformRunner {
                identity: identity(name),
                online: true,
                busy: false,
                deletable: false,
                labels: vec!["x64".into()],
            },
        }
    }

    pub fn runner_id(mut self, runner_id: &str) -> Self {
        self.runner.identity.metadata.runner_id = Some(runner_id.to_string());
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.runner.online = online;
        self
    }

    pub fn busy(mut self, busy: bool) -> Self {
        self.runner.busy = busy;
        self
    }

    pub fn deletable(mut self, deletable: bool) -> Self {
        self.runner.deletable = deletable;
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.runner.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn build(self) -> PlatformRunner {
        self.runner
    }
}
