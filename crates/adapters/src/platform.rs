// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port to the CI platform that owns jobs and runner registrations.
//!
//! Two wire variants implement this trait: the code-host REST API
//! (just-in-time config registration, deletion by numeric runner ID, HTTP
//! 422 on busy runners mapped to "not deleted") and the job-manager REST
//! API (registration additionally returns an agent token, base URL derived
//! from the job URL). The reconciler never sees the difference.

use async_trait::async_trait;
use rf_core::{PlatformRunner, RunnerContext, RunnerIdentity, RunnersHealth};
use serde::{Deserialize, Serialize};

/// Platform call failures.
///
/// `Api` covers transport problems and 5xx responses; it is retried only
/// inside the spawn worker's health-check loops. `Auth` is never recovered
/// and fails the whole reconcile tick.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform api error: {0}")]
    Api(String),
    #[error("platform authentication error: {0}")]
    Auth(String),
}

impl PlatformError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PlatformError::Auth(_))
    }
}

/// Details about the job a runner picked up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Seconds the job waited upstream before a runner started it.
    pub queue_duration: Option<f64>,
    pub status: Option<String>,
}

/// Abstract CI platform.
#[async_trait]
pub trait PlatformPort: Send + Sync {
    /// All runners registered under the configured prefix.
    async fn list_runners(&self) -> Result<Vec<PlatformRunner>, PlatformError>;

    /// Health information for a specific set of runners.
    ///
    /// Callable with an empty list; the response is then empty except for
    /// dangling entries the platform knows under our prefix.
    async fn get_runners_health(
        &self,
        requested: &[RunnerIdentity],
    ) -> Result<RunnersHealth, PlatformError>;

    /// A single runner, if the platform knows it.
    async fn get_runner(
        &self,
        identity: &RunnerIdentity,
    ) -> Result<Option<PlatformRunner>, PlatformError>;

    /// Register a runner and return the boot-time payload together with the
    /// authoritative record (in particular the platform-assigned ID).
    async fn get_runner_context(
        &self,
        identity: &RunnerIdentity,
        labels: &[String],
    ) -> Result<(RunnerContext, PlatformRunner), PlatformError>;

    /// Bulk delete by platform runner ID; returns the subset actually
    /// deleted. The platform refuses to delete a busy runner; such IDs are
    /// simply absent from the return.
    async fn delete_runners(&self, runner_ids: &[String]) -> Result<Vec<String>, PlatformError>;

    /// Delete a single runner registration, if present.
    async fn delete_runner(&self, identity: &RunnerIdentity) -> Result<(), PlatformError>;

    /// The job assigned to a runner, once one has been picked up.
    async fn get_job(&self, identity: &RunnerIdentity) -> Result<Option<JobInfo>, PlatformError>;
}
