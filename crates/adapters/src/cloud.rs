// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port to the IaaS cloud that hosts runner VMs.

use crate::ssh::{SshError, SshSession};
use async_trait::async_trait;
use rf_core::{InstanceId, RunnerContext, RunnerIdentity, Vm, VmConfig};
use std::path::PathBuf;

/// A VM's private key file could not be found or written.
#[derive(Debug, thiserror::Error)]
pub enum KeyfileError {
    #[error("missing keyfile for server {server}: {path}")]
    Missing { server: String, path: PathBuf },
    #[error("failed writing keyfile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("cloud api call failed: {0}")]
    Api(String),
    #[error("timed out creating server {0}")]
    CreateTimeout(InstanceId),
    #[error(transparent)]
    Keyfile(#[from] KeyfileError),
    #[error(transparent)]
    Ssh(#[from] SshError),
}

/// Abstract VM cloud.
///
/// Implementations own the keypair and security-group lifecycle: every
/// created VM has exactly one keypair named after its instance ID, and the
/// matching private key file is readable only by the manager's system user.
#[async_trait]
pub trait CloudPort: Send + Sync {
    /// Prefix scoping every resource this manager owns.
    fn name_prefix(&self) -> &str;

    /// Create one VM with the registration context embedded in its boot
    /// user data. A creation timeout rolls back the keypair best-effort.
    async fn create_vm(
        &self,
        identity: &RunnerIdentity,
        config: &VmConfig,
        context: &RunnerContext,
    ) -> Result<Vm, CloudError>;

    /// All VMs under the configured prefix.
    async fn list_vms(&self) -> Result<Vec<Vm>, CloudError>;

    /// A single VM by instance ID, if it exists. When the cloud holds
    /// several servers under one name, the newest wins and the older ones
    /// are deleted best-effort.
    async fn get_vm(&self, identity: &RunnerIdentity) -> Result<Option<Vm>, CloudError>;

    /// Delete the given VMs together with their keypairs and key files;
    /// returns the subset actually deleted.
    async fn delete_vms(&self, ids: &[InstanceId]) -> Result<Vec<InstanceId>, CloudError>;

    /// SSH session to a VM: tries each address and returns the first whose
    /// echo probe round-trips.
    async fn ssh_connection(&self, vm: &Vm) -> Result<Box<dyn SshSession>, CloudError>;

    /// Reap keypairs and key files whose owning VM no longer exists.
    async fn cleanup(&self) -> Result<(), CloudError>;
}
