// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner metadata and cross-port identity.

use crate::id::InstanceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which platform variant owns a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// REST code-hosting service; registration returns a just-in-time
    /// config blob, deletion is by numeric runner ID.
    #[default]
    CodeHost,
    /// Generic job manager; registration also returns an agent token and
    /// the base URL is derived from the job URL.
    JobManager,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::CodeHost => "code-host",
            PlatformKind::JobManager => "job-manager",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform-side details attached to an instance.
///
/// `runner_id` is assigned by the platform during registration; a VM whose
/// metadata never received one never finished registering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunnerMetadata {
    pub platform: PlatformKind,
    pub runner_id: Option<String>,
    /// Base URL for job-manager platforms; absent for the code host.
    pub url: Option<String>,
}

impl RunnerMetadata {
    /// Metadata for a job-manager runner rooted at `base_url`.
    pub fn job_manager(base_url: impl Into<String>) -> Self {
        Self { platform: PlatformKind::JobManager, runner_id: None, url: Some(base_url.into()) }
    }
}

/// The pair passed to every cross-port call so each side can look the
/// runner up in its own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerIdentity {
    pub instance_id: InstanceId,
    pub metadata: RunnerMetadata,
}

impl RunnerIdentity {
    pub fn new(instance_id: InstanceId, metadata: RunnerMetadata) -> Self {
        Self { instance_id, metadata }
    }
}

impl fmt::Display for RunnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instance_id)
    }
}
