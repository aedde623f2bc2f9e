// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory port implementations for tests.
//!
//! Each fake is scriptable: callers seed state, inject failures, and read
//! back recorded calls. The fakes model the behaviors the engine depends
//! on: busy runners refuse deletion, registration assigns runner IDs, and
//! requested-but-unknown runners come back deletable.

use crate::cloud::{CloudError, CloudPort};
use crate::openstack::compute::{
    ComputeApi, ComputeError, CreateServerSpec, KeypairRecord, SecurityGroupRecord,
    SecurityGroupRule, ServerRecord,
};
use crate::platform::{JobInfo, PlatformError, PlatformPort};
use crate::ssh::{CommandOutput, SshError, SshFactory, SshSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rf_core::{
    InstanceId, PlatformRunner, RunnerContext, RunnerIdentity, RunnersHealth, Vm, VmConfig,
    VmState,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn default_created_at() -> DateTime<Utc> {
    rf_core::test_support::default_created_at()
}

// ── Fake compute API ──────────────────────────────────────────────────

#[derive(Default)]
struct ComputeState {
    servers: Vec<ServerRecord>,
    keypairs: BTreeMap<String, String>,
    groups: Vec<SecurityGroupRecord>,
    next_id: u64,
    created_at: Option<DateTime<Utc>>,
    create_server_errors: u32,
    hang_creates: bool,
}

/// In-memory [`ComputeApi`].
#[derive(Clone, Default)]
pub struct FakeCompute {
    state: Arc<Mutex<ComputeState>>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp assigned to servers created from now on.
    pub fn set_created_at(&self, created_at: DateTime<Utc>) {
        self.state.lock().created_at = Some(created_at);
    }

    /// Fail the next `n` create_server calls with an API error.
    pub fn fail_next_creates(&self, n: u32) {
        self.state.lock().create_server_errors = n;
    }

    /// Make create_server block forever, for creation-timeout tests.
    pub fn hang_creates(&self) {
        self.state.lock().hang_creates = true;
    }

    /// Seed a raw server record.
    pub fn add_server(&self, server: ServerRecord) {
        self.state.lock().servers.push(server);
    }

    /// Convenience: seed a server named `name` with empty metadata.
    pub fn add_named_server(&self, name: &str) -> ServerRecord {
        let record = ServerRecord {
            id: format!("srv-{name}"),
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            created_at: default_created_at(),
            addresses: vec!["10.0.0.5".to_string()],
            metadata: BTreeMap::new(),
        };
        self.add_server(record.clone());
        record
    }

    pub fn servers(&self) -> Vec<ServerRecord> {
        self.state.lock().servers.clone()
    }

    pub fn keypair_names(&self) -> Vec<String> {
        self.state.lock().keypairs.keys().cloned().collect()
    }

    pub fn add_keypair(&self, name: &str) {
        self.state.lock().keypairs.insert(name.to_string(), format!("key-{name}"));
    }

    pub fn security_group(&self, name: &str) -> Option<SecurityGroupRecord> {
        self.state.lock().groups.iter().find(|group| group.name == name).cloned()
    }

    pub fn security_group_count(&self) -> usize {
        self.state.lock().groups.len()
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn create_server(&self, spec: CreateServerSpec) -> Result<ServerRecord, ComputeError> {
        let hang = self.state.lock().hang_creates;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock();
        if state.create_server_errors > 0 {
            state.create_server_errors -= 1;
            return Err(ComputeError::Api("injected create failure".into()));
        }
        state.next_id += 1;
        let record = ServerRecord {
            id: format!("srv-{}", state.next_id),
            name: spec.name,
            status: "ACTIVE".to_string(),
            created_at: state.created_at.unwrap_or_else(default_created_at),
            addresses: vec![format!("10.0.0.{}", state.next_id)],
            metadata: spec.metadata,
        };
        state.servers.push(record.clone());
        Ok(record)
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, ComputeError> {
        Ok(self.state.lock().servers.clone())
    }

    async fn search_servers(&self, name: &str) -> Result<Vec<ServerRecord>, ComputeError> {
        Ok(self.state.lock().servers.iter().filter(|s| s.name == name).cloned().collect())
    }

    async fn delete_server(&self, server_id: &str) -> Result<(), ComputeError> {
        self.state.lock().servers.retain(|s| s.id != server_id);
        Ok(())
    }

    async fn create_keypair(&self, name: &str) -> Result<KeypairRecord, ComputeError> {
        let private_key = format!("key-{name}");
        self.state.lock().keypairs.insert(name.to_string(), private_key.clone());
        Ok(KeypairRecord { name: name.to_string(), private_key })
    }

    async fn delete_keypair(&self, name: &str) -> Result<bool, ComputeError> {
        Ok(self.state.lock().keypairs.remove(name).is_some())
    }

    async fn list_keypairs(&self) -> Result<Vec<String>, ComputeError> {
        Ok(self.keypair_names())
    }

    async fn find_security_group(
        &self,
        name: &str,
    ) -> Result<Option<SecurityGroupRecord>, ComputeError> {
        Ok(self.security_group(name))
    }

    async fn create_security_group(
        &self,
        name: &str,
        _description: &str,
    ) -> Result<SecurityGroupRecord, ComputeError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let group = SecurityGroupRecord {
            id: format!("sg-{}", state.next_id),
            name: name.to_string(),
            rules: Vec::new(),
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn add_security_group_rule(
        &self,
        group_id: &str,
        rule: SecurityGroupRule,
    ) -> Result<(), ComputeError> {
        let mut state = self.state.lock();
        if let Some(group) = state.groups.iter_mut().find(|group| group.id == group_id) {
            group.rules.push(rule);
        }
        Ok(())
    }
}

// ── Fake SSH ──────────────────────────────────────────────────────────

/// Scripted remote filesystem for one VM.
#[derive(Clone, Default)]
pub struct FakeSshSession {
    files: BTreeMap<String, Vec<u8>>,
}

impl FakeSshSession {
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_vec()))
                .collect(),
        }
    }
}

#[async_trait]
impl SshSession for FakeSshSession {
    async fn run(&mut self, command: &str, _timeout: Duration) -> Result<CommandOutput, SshError> {
        if let Some(rest) = command.strip_prefix("echo ") {
            return Ok(CommandOutput {
                exit_code: 0,
                stdout: format!("{rest}\n"),
                stderr: String::new(),
            });
        }
        if let Some(path) = command.strip_prefix("stat -c %s ") {
            return Ok(match self.files.get(path.trim()) {
                Some(content) => CommandOutput {
                    exit_code: 0,
                    stdout: format!("{}\n", content.len()),
                    stderr: String::new(),
                },
                None => CommandOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: format!("stat: cannot statx '{path}': No such file or directory\n"),
                },
            });
        }
        Ok(CommandOutput { exit_code: 127, stdout: String::new(), stderr: "unknown command\n".into() })
    }

    async fn download(
        &mut self,
        remote_path: &str,
        max_size: u64,
        _timeout: Duration,
    ) -> Result<Vec<u8>, SshError> {
        let content = self
            .files
            .get(remote_path)
            .ok_or_else(|| SshError::Transport(format!("no such file: {remote_path}")))?;
        if content.len() as u64 > max_size {
            return Err(SshError::FileTooLarge {
                path: remote_path.to_string(),
                size: content.len() as u64,
                max: max_size,
            });
        }
        Ok(content.clone())
    }
}

/// Hands out [`FakeSshSession`]s by address.
#[derive(Clone, Default)]
pub struct FakeSshFactory {
    sessions: Arc<Mutex<BTreeMap<String, FakeSshSession>>>,
}

impl FakeSshFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&self, address: &str, session: FakeSshSession) {
        self.sessions.lock().insert(address.to_string(), session);
    }
}

#[async_trait]
impl SshFactory for FakeSshFactory {
    async fn connect(
        &self,
        address: &str,
        _key_path: &Path,
        _timeout: Duration,
    ) -> Result<Box<dyn SshSession>, SshError> {
        match self.sessions.lock().get(address) {
            Some(session) => Ok(Box::new(session.clone())),
            None => Err(SshError::Transport(format!("connection refused: {address}"))),
        }
    }
}

// ── Fake platform ─────────────────────────────────────────────────────

#[derive(Default)]
struct PlatformState {
    runners: BTreeMap<String, PlatformRunner>,
    jobs: BTreeMap<String, JobInfo>,
    job_delays: BTreeMap<String, u32>,
    runner_delays: BTreeMap<String, u32>,
    health_failures: HashSet<String>,
    next_runner_id: u64,
    deleted_ids: Vec<String>,
    registered: Vec<String>,
    get_runner_errors: u32,
    auth_failure: bool,
}

/// In-memory [`PlatformPort`].
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a runner record keyed by instance name.
    pub fn insert_runner(&self, runner: PlatformRunner) {
        let mut state = self.state.lock();
        state.runners.insert(runner.identity.instance_id.as_str().to_string(), runner);
    }

    /// Make every call fail with an authentication error.
    pub fn set_auth_failure(&self) {
        self.state.lock().auth_failure = true;
    }

    /// Report these instance names as failed (no data) in health responses.
    pub fn fail_health_for(&self, name: &str) {
        self.state.lock().health_failures.insert(name.to_string());
    }

    /// Fail the next `n` get_runner calls with an API error.
    pub fn fail_next_get_runner(&self, n: u32) {
        self.state.lock().get_runner_errors = n;
    }

    /// Hide a registered runner from get_runner for the next `polls` calls.
    pub fn delay_runner_visibility(&self, name: &str, polls: u32) {
        self.state.lock().runner_delays.insert(name.to_string(), polls);
    }

    /// Assign a job to a runner, optionally visible only after `polls`
    /// get_job calls.
    pub fn set_job(&self, name: &str, job: JobInfo, polls: u32) {
        let mut state = self.state.lock();
        state.jobs.insert(name.to_string(), job);
        if polls > 0 {
            state.job_delays.insert(name.to_string(), polls);
        }
    }

    pub fn mark_online(&self, name: &str) {
        if let Some(runner) = self.state.lock().runners.get_mut(name) {
            runner.online = true;
        }
    }

    pub fn mark_busy(&self, name: &str) {
        if let Some(runner) = self.state.lock().runners.get_mut(name) {
            runner.busy = true;
        }
    }

    pub fn runner_names(&self) -> Vec<String> {
        self.state.lock().runners.keys().cloned().collect()
    }

    /// Runner IDs deleted so far.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().deleted_ids.clone()
    }

    /// Instance names registered through get_runner_context.
    pub fn registered_names(&self) -> Vec<String> {
        self.state.lock().registered.clone()
    }

    fn check_auth(&self) -> Result<(), PlatformError> {
        if self.state.lock().auth_failure {
            return Err(PlatformError::Auth("token rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformPort for FakePlatform {
    async fn list_runners(&self) -> Result<Vec<PlatformRunner>, PlatformError> {
        self.check_auth()?;
        Ok(self.state.lock().runners.values().cloned().collect())
    }

    async fn get_runners_health(
        &self,
        requested: &[RunnerIdentity],
    ) -> Result<RunnersHealth, PlatformError> {
        self.check_auth()?;
        let state = self.state.lock();
        let requested_names: HashSet<&str> =
            requested.iter().map(|identity| identity.instance_id.as_str()).collect();

        let mut health = RunnersHealth::default();
        for identity in requested {
            let name = identity.instance_id.as_str();
            if state.health_failures.contains(name) {
                health.failed.push(identity.clone());
                continue;
            }
            match state.runners.get(name) {
                Some(runner) => health.requested.push(runner.clone()),
                // The platform no longer knows this runner: report it as a
                // deletable entry so the owning VM gets reaped.
                None => health.requested.push(PlatformRunner {
                    identity: identity.clone(),
                    online: false,
                    busy: false,
                    deletable: true,
                    labels: Vec::new(),
                }),
            }
        }
        for (name, runner) in state.runners.iter() {
            if !requested_names.contains(name.as_str()) {
                health.non_requested.push(runner.clone());
            }
        }
        Ok(health)
    }

    async fn get_runner(
        &self,
        identity: &RunnerIdentity,
    ) -> Result<Option<PlatformRunner>, PlatformError> {
        self.check_auth()?;
        let mut state = self.state.lock();
        if state.get_runner_errors > 0 {
            state.get_runner_errors -= 1;
            return Err(PlatformError::Api("injected get_runner failure".into()));
        }
        let name = identity.instance_id.as_str();
        if let Some(remaining) = state.runner_delays.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.runners.get(name).cloned())
    }

    async fn get_runner_context(
        &self,
        identity: &RunnerIdentity,
        labels: &[String],
    ) -> Result<(RunnerContext, PlatformRunner), PlatformError> {
        self.check_auth()?;
        let mut state = self.state.lock();
        state.next_runner_id += 1;
        let runner_id = state.next_runner_id.to_string();
        let mut registered = identity.clone();
        registered.metadata.runner_id = Some(runner_id.clone());
        let runner = PlatformRunner {
            identity: registered,
            online: false,
            busy: false,
            deletable: false,
            labels: labels.to_vec(),
        };
        let name = identity.instance_id.as_str().to_string();
        state.runners.insert(name.clone(), runner.clone());
        state.registered.push(name);
        Ok((RunnerContext::new(format!("jit-config-{runner_id}")), runner))
    }

    async fn delete_runners(&self, runner_ids: &[String]) -> Result<Vec<String>, PlatformError> {
        self.check_auth()?;
        let mut state = self.state.lock();
        let mut deleted = Vec::new();
        for runner_id in runner_ids {
            let entry = state
                .runners
                .iter()
                .find(|(_, runner)| runner.runner_id() == Some(runner_id.as_str()))
                .map(|(name, runner)| (name.clone(), runner.busy));
            match entry {
                // Busy runners are refused; the ID is absent from the return.
                Some((_, true)) => {}
                Some((name, false)) => {
                    state.runners.remove(&name);
                    state.deleted_ids.push(runner_id.clone());
                    deleted.push(runner_id.clone());
                }
                None => {}
            }
        }
        Ok(deleted)
    }

    async fn delete_runner(&self, identity: &RunnerIdentity) -> Result<(), PlatformError> {
        self.check_auth()?;
        let mut state = self.state.lock();
        if let Some(runner) = state.runners.remove(identity.instance_id.as_str()) {
            if let Some(runner_id) = runner.runner_id() {
                let runner_id = runner_id.to_string();
                state.deleted_ids.push(runner_id);
            }
        }
        Ok(())
    }

    async fn get_job(&self, identity: &RunnerIdentity) -> Result<Option<JobInfo>, PlatformError> {
        self.check_auth()?;
        let mut state = self.state.lock();
        let name = identity.instance_id.as_str();
        if let Some(remaining) = state.job_delays.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.jobs.get(name).cloned())
    }
}

// ── Fake cloud ────────────────────────────────────────────────────────

#[derive(Default)]
struct CloudState {
    vms: BTreeMap<String, Vm>,
    ssh_files: BTreeMap<String, FakeSshSession>,
    created: Vec<InstanceId>,
    deleted: Vec<InstanceId>,
    created_at: Option<DateTime<Utc>>,
    create_failures: u32,
    cleanup_calls: u32,
}

/// In-memory [`CloudPort`].
#[derive(Clone)]
pub struct FakeCloud {
    prefix: String,
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), state: Arc::new(Mutex::new(CloudState::default())) }
    }

    pub fn insert_vm(&self, vm: Vm) {
        self.state.lock().vms.insert(vm.instance_id.as_str().to_string(), vm);
    }

    /// Timestamp assigned to VMs created from now on.
    pub fn set_created_at(&self, created_at: DateTime<Utc>) {
        self.state.lock().created_at = Some(created_at);
    }

    /// Fail the next `n` create_vm calls.
    pub fn fail_next_creates(&self, n: u32) {
        self.state.lock().create_failures = n;
    }

    /// Script the remote metric files served over SSH for one VM.
    pub fn set_ssh_files(&self, name: &str, files: &[(&str, &[u8])]) {
        self.state.lock().ssh_files.insert(name.to_string(), FakeSshSession::with_files(files));
    }

    pub fn vm_names(&self) -> Vec<String> {
        self.state.lock().vms.keys().cloned().collect()
    }

    pub fn created(&self) -> Vec<InstanceId> {
        self.state.lock().created.clone()
    }

    pub fn deleted(&self) -> Vec<InstanceId> {
        self.state.lock().deleted.clone()
    }

    pub fn cleanup_calls(&self) -> u32 {
        self.state.lock().cleanup_calls
    }
}

#[async_trait]
impl CloudPort for FakeCloud {
    fn name_prefix(&self) -> &str {
        &self.prefix
    }

    async fn create_vm(
        &self,
        identity: &RunnerIdentity,
        _config: &VmConfig,
        _context: &RunnerContext,
    ) -> Result<Vm, CloudError> {
        let mut state = self.state.lock();
        if state.create_failures > 0 {
            state.create_failures -= 1;
            return Err(CloudError::Api("injected create failure".into()));
        }
        let name = identity.instance_id.as_str().to_string();
        let vm = Vm {
            instance_id: identity.instance_id.clone(),
            metadata: identity.metadata.clone(),
            created_at: state.created_at.unwrap_or_else(default_created_at),
            state: VmState::Active,
            addresses: vec!["10.0.0.5".to_string()],
            server_id: format!("srv-{name}"),
        };
        state.vms.insert(name, vm.clone());
        state.created.push(identity.instance_id.clone());
        Ok(vm)
    }

    async fn list_vms(&self) -> Result<Vec<Vm>, CloudError> {
        Ok(self.state.lock().vms.values().cloned().collect())
    }

    async fn get_vm(&self, identity: &RunnerIdentity) -> Result<Option<Vm>, CloudError> {
        Ok(self.state.lock().vms.get(identity.instance_id.as_str()).cloned())
    }

    async fn delete_vms(&self, ids: &[InstanceId]) -> Result<Vec<InstanceId>, CloudError> {
        let mut state = self.state.lock();
        let mut deleted = Vec::new();
        for id in ids {
            if state.vms.remove(id.as_str()).is_some() {
                state.deleted.push(id.clone());
                deleted.push(id.clone());
            }
        }
        Ok(deleted)
    }

    async fn ssh_connection(&self, vm: &Vm) -> Result<Box<dyn SshSession>, CloudError> {
        let state = self.state.lock();
        match state.ssh_files.get(vm.instance_id.as_str()) {
            Some(session) => Ok(Box::new(session.clone())),
            None => Err(SshError::NoConnectableAddress(vm.instance_id.as_str().to_string()).into()),
        }
    }

    async fn cleanup(&self) -> Result<(), CloudError> {
        self.state.lock().cleanup_calls += 1;
        Ok(())
    }
}
