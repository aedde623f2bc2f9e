// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud layer implementing [`CloudPort`] over the compute-API seam.
//!
//! Owns the protocol around the raw SDK: prefix-scoped listing, the
//! unique-name resolution for cloud double-creates, keypair and key-file
//! coupling, the ensure-once security group, creation-timeout rollback, and
//! keypair garbage collection.

pub mod compute;
pub mod keys;
pub mod secgroup;

use crate::cloud::{CloudError, CloudPort, KeyfileError};
use crate::ssh::{SshError, SshFactory, SshSession};
use async_trait::async_trait;
use compute::{ComputeApi, ComputeError, CreateServerSpec, ServerRecord};
use keys::KeyStore;
use rf_core::{InstanceId, PlatformKind, RunnerContext, RunnerIdentity, RunnerMetadata, Vm, VmConfig, VmState};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Default bound on VM creation.
pub const CREATE_SERVER_TIMEOUT: Duration = Duration::from_secs(360);

const SSH_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const SSH_PROBE_STRING: &str = "runner-ssh-probe";
const SSH_USER_COMMENT: &str = "runner";

// Server metadata keys carrying the runner-side identity.
const META_PLATFORM: &str = "runner-platform";
const META_RUNNER_ID: &str = "runner-id";
const META_URL: &str = "runner-url";

impl From<ComputeError> for CloudError {
    fn from(error: ComputeError) -> Self {
        CloudError::Api(error.to_string())
    }
}

/// OpenStack-backed cloud port.
pub struct OpenStackCloud<C, S> {
    api: C,
    ssh: S,
    keys: KeyStore,
    prefix: String,
    network: String,
    create_timeout: Duration,
    security_group_id: OnceCell<String>,
}

impl<C: ComputeApi, S: SshFactory> OpenStackCloud<C, S> {
    pub fn new(api: C, ssh: S, keys: KeyStore, prefix: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            api,
            ssh,
            keys,
            prefix: prefix.into(),
            network: network.into(),
            create_timeout: CREATE_SERVER_TIMEOUT,
            security_group_id: OnceCell::new(),
        }
    }

    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    async fn security_group_id(&self) -> Result<&str, CloudError> {
        let id = self
            .security_group_id
            .get_or_try_init(|| async {
                secgroup::ensure_security_group(&self.api).await.map(|group| group.id)
            })
            .await?;
        Ok(id)
    }

    fn vm_from_server(&self, server: &ServerRecord) -> Option<Vm> {
        let instance_id = InstanceId::from_name(&self.prefix, &server.name)?;
        Some(Vm {
            instance_id,
            metadata: metadata_from_map(&server.metadata),
            created_at: server.created_at,
            state: VmState::parse(&server.status),
            addresses: server.addresses.clone(),
            server_id: server.id.clone(),
        })
    }

    /// Resolve duplicate servers under one name: the newest wins, the rest
    /// are deleted best-effort.
    async fn ensure_unique(&self, mut servers: Vec<ServerRecord>) -> Option<ServerRecord> {
        servers.sort_by_key(|server| server.created_at);
        let latest = servers.pop()?;
        for outdated in servers {
            tracing::warn!(
                name = outdated.name,
                server_id = outdated.id,
                "deleting server with duplicate name"
            );
            if let Err(error) = self.api.delete_server(&outdated.id).await {
                tracing::warn!(
                    name = outdated.name,
                    server_id = outdated.id,
                    %error,
                    "unable to delete server with duplicate name"
                );
            }
        }
        Some(latest)
    }

    async fn delete_keypair(&self, name: &str) {
        match self.api.delete_keypair(name).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(server = name, "unable to delete keypair"),
            Err(error) => tracing::warn!(server = name, %error, "unable to delete keypair"),
        }
        self.keys.remove(name);
    }
}

#[async_trait]
impl<C: ComputeApi, S: SshFactory> CloudPort for OpenStackCloud<C, S> {
    fn name_prefix(&self) -> &str {
        &self.prefix
    }

    async fn create_vm(
        &self,
        identity: &RunnerIdentity,
        config: &VmConfig,
        context: &RunnerContext,
    ) -> Result<Vm, CloudError> {
        let name = identity.instance_id.as_str();
        tracing::info!(server = name, image = config.image, flavor = config.flavor, "creating server");

        let security_group_id = self.security_group_id().await?.to_string();
        let keypair = self.api.create_keypair(name).await?;
        self.keys.write(name, &keypair.private_key)?;

        let spec = CreateServerSpec {
            name: name.to_string(),
            image: config.image.clone(),
            flavor: config.flavor.clone(),
            network: self.network.clone(),
            key_name: keypair.name,
            security_group_id,
            user_data: render_user_data(context),
            metadata: metadata_map(&identity.metadata),
        };

        match tokio::time::timeout(self.create_timeout, self.api.create_server(spec)).await {
            Ok(Ok(server)) => self
                .vm_from_server(&server)
                .ok_or_else(|| CloudError::Api(format!("created server has foreign name {}", server.name))),
            Ok(Err(error)) => {
                tracing::error!(server = name, %error, "failed to create server");
                self.delete_keypair(name).await;
                Err(error.into())
            }
            Err(_) => {
                tracing::error!(server = name, "timeout creating server, rolling back");
                if let Ok(servers) = self.api.search_servers(name).await {
                    for server in servers {
                        let _ = self.api.delete_server(&server.id).await;
                    }
                }
                self.delete_keypair(name).await;
                Err(CloudError::CreateTimeout(identity.instance_id.clone()))
            }
        }
    }

    async fn list_vms(&self) -> Result<Vec<Vm>, CloudError> {
        let servers = self.api.list_servers().await?;
        let mut by_name: HashMap<String, Vec<ServerRecord>> = HashMap::new();
        for server in servers {
            if InstanceId::name_has_prefix(&self.prefix, &server.name) {
                by_name.entry(server.name.clone()).or_default().push(server);
            }
        }

        let mut vms = Vec::with_capacity(by_name.len());
        for (_, duplicates) in by_name {
            if let Some(server) = self.ensure_unique(duplicates).await {
                if let Some(vm) = self.vm_from_server(&server) {
                    vms.push(vm);
                }
            }
        }
        vms.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(vms)
    }

    async fn get_vm(&self, identity: &RunnerIdentity) -> Result<Option<Vm>, CloudError> {
        let servers = self.api.search_servers(identity.instance_id.as_str()).await?;
        Ok(self.ensure_unique(servers).await.and_then(|server| self.vm_from_server(&server)))
    }

    async fn delete_vms(&self, ids: &[InstanceId]) -> Result<Vec<InstanceId>, CloudError> {
        let mut deleted = Vec::new();
        for id in ids {
            tracing::info!(server = %id, "deleting server");
            let servers = match self.api.search_servers(id.as_str()).await {
                Ok(servers) => servers,
                Err(error) => {
                    tracing::warn!(server = %id, %error, "unable to look up server for deletion");
                    continue;
                }
            };
            let mut removed = servers.is_empty();
            if let Some(server) = self.ensure_unique(servers).await {
                match self.api.delete_server(&server.id).await {
                    Ok(()) => removed = true,
                    Err(error) => {
                        tracing::warn!(server = %id, %error, "unable to delete server");
                    }
                }
            }
            self.delete_keypair(id.as_str()).await;
            if removed {
                deleted.push(id.clone());
            }
        }
        Ok(deleted)
    }

    async fn ssh_connection(&self, vm: &Vm) -> Result<Box<dyn SshSession>, CloudError> {
        let name = vm.instance_id.as_str();
        let key_path = self.keys.key_path(name);
        if !key_path.exists() {
            return Err(KeyfileError::Missing { server: name.to_string(), path: key_path }.into());
        }
        if vm.addresses.is_empty() {
            return Err(SshError::NoAddresses(name.to_string()).into());
        }

        for address in &vm.addresses {
            let mut session =
                match self.ssh.connect(address, &key_path, SSH_PROBE_TIMEOUT).await {
                    Ok(session) => session,
                    Err(error) => {
                        tracing::warn!(server = name, address, %error, "unable to open ssh session");
                        continue;
                    }
                };
            let probe = format!("echo {SSH_PROBE_STRING}");
            match session.run(&probe, SSH_PROBE_TIMEOUT).await {
                Ok(output) if output.success() && output.stdout.contains(SSH_PROBE_STRING) => {
                    return Ok(session);
                }
                Ok(_) => {
                    tracing::warn!(server = name, address, "ssh probe failed");
                }
                Err(error) => {
                    tracing::warn!(server = name, address, %error, "ssh probe errored");
                }
            }
        }
        Err(SshError::NoConnectableAddress(name.to_string()).into())
    }

    async fn cleanup(&self) -> Result<(), CloudError> {
        let servers = self.api.list_servers().await?;
        let live: HashSet<String> = servers
            .into_iter()
            .filter(|server| InstanceId::name_has_prefix(&self.prefix, &server.name))
            .map(|server| server.name)
            .collect();

        let deleted_files = self.keys.cleanup(&self.prefix, &live);
        tracing::info!(deleted_files, "cleaned up ssh key files");

        for keypair in self.api.list_keypairs().await? {
            if InstanceId::name_has_prefix(&self.prefix, &keypair) && !live.contains(&keypair) {
                self.delete_keypair(&keypair).await;
            }
        }
        Ok(())
    }
}

/// Boot user data: stores the registration context where the runner agent's
/// install hook expects it.
fn render_user_data(context: &RunnerContext) -> String {
    format!(
        "#!/bin/bash\nset -euo pipefail\ninstall -d -m 0700 /etc/{SSH_USER_COMMENT}\ncat > /etc/{SSH_USER_COMMENT}/context <<'RUNNER_CONTEXT'\n{}\nRUNNER_CONTEXT\nsystemctl start runner-agent.service\n",
        context.payload
    )
}

fn metadata_map(metadata: &RunnerMetadata) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert(META_PLATFORM.to_string(), metadata.platform.as_str().to_string());
    if let Some(runner_id) = &metadata.runner_id {
        map.insert(META_RUNNER_ID.to_string(), runner_id.clone());
    }
    if let Some(url) = &metadata.url {
        map.insert(META_URL.to_string(), url.clone());
    }
    map
}

fn metadata_from_map(map: &BTreeMap<String, String>) -> RunnerMetadata {
    let platform = match map.get(META_PLATFORM).map(String::as_str) {
        Some("job-manager") => PlatformKind::JobManager,
        _ => PlatformKind::CodeHost,
    };
    RunnerMetadata {
        platform,
        runner_id: map.get(META_RUNNER_ID).cloned(),
        url: map.get(META_URL).cloned(),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
