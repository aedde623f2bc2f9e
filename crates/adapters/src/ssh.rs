// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH seam used for probing runner VMs and pulling metric files.
//!
//! The concrete transport lives behind [`SshFactory`]; the cloud layer owns
//! address selection and the echo probe, the metrics extractor owns the
//! size-capped file pulls.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SshError {
    #[error("no addresses for server {0}")]
    NoAddresses(String),
    #[error("no connectable ssh address for server {0}")]
    NoConnectableAddress(String),
    #[error("ssh transport error: {0}")]
    Transport(String),
    #[error("ssh operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote file {path} too large: {size} > {max} bytes")]
    FileTooLarge { path: String, size: u64, max: u64 },
}

/// Result of running one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One established SSH session to a runner VM.
#[async_trait]
pub trait SshSession: Send {
    async fn run(&mut self, command: &str, timeout: Duration)
        -> Result<CommandOutput, SshError>;

    /// Fetch a remote file through a sink that fails once `max_size` bytes
    /// have been exceeded, regardless of what the remote claims.
    async fn download(
        &mut self,
        remote_path: &str,
        max_size: u64,
        timeout: Duration,
    ) -> Result<Vec<u8>, SshError>;
}

/// Opens sessions; one per (address, key) attempt.
#[async_trait]
pub trait SshFactory: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        key_path: &Path,
        timeout: Duration,
    ) -> Result<Box<dyn SshSession>, SshError>;
}
