// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulated cloud and platform for local evaluation.
//!
//! `rfd` drives the real reconcile loop against these providers so the
//! policies, cleanup rules, and metrics can be exercised without cloud
//! credentials. Created VMs come up immediately; registered runners go
//! online on the platform and pick up a simulated job on first poll.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rf_adapters::cloud::{CloudError, CloudPort};
use rf_adapters::platform::{JobInfo, PlatformError, PlatformPort};
use rf_adapters::ssh::{SshError, SshSession};
use rf_core::{
    InstanceId, PlatformRunner, RunnerContext, RunnerIdentity, RunnersHealth, Vm, VmConfig,
    VmState,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory platform: registration assigns IDs, runners go online
/// immediately, every runner is handed a job when asked.
#[derive(Clone, Default)]
pub struct SimPlatform {
    state: Arc<Mutex<SimPlatformState>>,
}

#[derive(Default)]
struct SimPlatformState {
    runners: BTreeMap<String, PlatformRunner>,
    next_runner_id: u64,
}

#[async_trait]
impl PlatformPort for SimPlatform {
    async fn list_runners(&self) -> Result<Vec<PlatformRunner>, PlatformError> {
        Ok(self.state.lock().runners.values().cloned().collect())
    }

    async fn get_runners_health(
        &self,
        requested: &[RunnerIdentity],
    ) -> Result<RunnersHealth, PlatformError> {
        let state = self.state.lock();
        let mut health = RunnersHealth::default();
        for identity in requested {
            match state.runners.get(identity.instance_id.as_str()) {
                Some(runner) => health.requested.push(runner.clone()),
                None => health.requested.push(PlatformRunner {
                    identity: identity.clone(),
                    online: false,
                    busy: false,
                    deletable: true,
                    labels: Vec::new(),
                }),
            }
        }
        let requested_names: Vec<&str> =
            requested.iter().map(|identity| identity.instance_id.as_str()).collect();
        for (name, runner) in state.runners.iter() {
            if !requested_names.contains(&name.as_str()) {
                health.non_requested.push(runner.clone());
            }
        }
        Ok(health)
    }

    async fn get_runner(
        &self,
        identity: &RunnerIdentity,
    ) -> Result<Option<PlatformRunner>, PlatformError> {
        Ok(self.state.lock().runners.get(identity.instance_id.as_str()).cloned())
    }

    async fn get_runner_context(
        &self,
        identity: &RunnerIdentity,
        labels: &[String],
    ) -> Result<(RunnerContext, PlatformRunner), PlatformError> {
        let mut state = self.state.lock();
        state.next_runner_id += 1;
        let runner_id = state.next_runner_id.to_string();
        let mut registered = identity.clone();
        registered.metadata.runner_id = Some(runner_id.clone());
        let runner = PlatformRunner {
            identity: registered,
            online: true,
            busy: false,
            deletable: false,
            labels: labels.to_vec(),
        };
        state.runners.insert(identity.instance_id.as_str().to_string(), runner.clone());
        Ok((RunnerContext::new(format!("sim-context-{runner_id}")), runner))
    }

    async fn delete_runners(&self, runner_ids: &[String]) -> Result<Vec<String>, PlatformError> {
        let mut state = self.state.lock();
        let mut deleted = Vec::new();
        for runner_id in runner_ids {
            let name = state
                .runners
                .iter()
                .find(|(_, runner)| {
                    runner.runner_id() == Some(runner_id.as_str()) && !runner.busy
                })
                .map(|(name, _)| name.clone());
            if let Some(name) = name {
                state.runners.remove(&name);
                deleted.push(runner_id.clone());
            }
        }
        Ok(deleted)
    }

    async fn delete_runner(&self, identity: &RunnerIdentity) -> Result<(), PlatformError> {
        self.state.lock().runners.remove(identity.instance_id.as_str());
        Ok(())
    }

    async fn get_job(&self, _identity: &RunnerIdentity) -> Result<Option<JobInfo>, PlatformError> {
        Ok(Some(JobInfo { queue_duration: Some(2.0), status: Some("started".into()) }))
    }
}

/// In-memory cloud: servers exist as records only; SSH is unavailable, so
/// metric extraction logs and moves on, exactly as with unreachable VMs.
#[derive(Clone)]
pub struct SimCloud {
    prefix: String,
    state: Arc<Mutex<BTreeMap<String, Vm>>>,
}

impl SimCloud {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), state: Arc::new(Mutex::new(BTreeMap::new())) }
    }
}

#[async_trait]
impl CloudPort for SimCloud {
    fn name_prefix(&self) -> &str {
        &self.prefix
    }

    async fn create_vm(
        &self,
        identity: &RunnerIdentity,
        _config: &VmConfig,
        _context: &RunnerContext,
    ) -> Result<Vm, CloudError> {
        let name = identity.instance_id.as_str().to_string();
        let vm = Vm {
            instance_id: identity.instance_id.clone(),
            metadata: identity.metadata.clone(),
            created_at: Utc::now(),
            state: VmState::Active,
            addresses: vec!["192.0.2.1".to_string()],
            server_id: format!("sim-{name}"),
        };
        self.state.lock().insert(name, vm.clone());
        Ok(vm)
    }

    async fn list_vms(&self) -> Result<Vec<Vm>, CloudError> {
        Ok(self.state.lock().values().cloned().collect())
    }

    async fn get_vm(&self, identity: &RunnerIdentity) -> Result<Option<Vm>, CloudError> {
        Ok(self.state.lock().get(identity.instance_id.as_str()).cloned())
    }

    async fn delete_vms(&self, ids: &[InstanceId]) -> Result<Vec<InstanceId>, CloudError> {
        let mut state = self.state.lock();
        let mut deleted = Vec::new();
        for id in ids {
            if state.remove(id.as_str()).is_some() {
                deleted.push(id.clone());
            }
        }
        Ok(deleted)
    }

    async fn ssh_connection(&self, vm: &Vm) -> Result<Box<dyn SshSession>, CloudError> {
        Err(SshError::NoConnectableAddress(vm.instance_id.as_str().to_string()).into())
    }

    async fn cleanup(&self) -> Result<(), CloudError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "sim_tests.rs"]
mod tests;
