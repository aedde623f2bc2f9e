// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn workers: create one VM per config and shepherd reactive runners
//! until their job is picked up.

use crate::policy::PolicyKind;
use crate::wait::{wait_for, WaitError};
use futures_util::stream::{self, StreamExt};
use rf_adapters::{CloudError, CloudPort, PlatformError, PlatformPort};
use rf_core::{InstanceId, PlatformRunner, RunnerContext, RunnerIdentity, VmConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on concurrent spawn workers.
pub const SPAWN_POOL_MAX: usize = 30;

/// Cap on waiting for the platform to observe a new reactive runner.
pub const RUNNER_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Cap on waiting for a reactive runner's job to be picked up.
pub const JOB_PICKUP_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Interval between platform polls.
pub const PLATFORM_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed creating runner vm: {0}")]
    Runner(#[from] CloudError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("timed out waiting for {waiting_for} for runner {runner}")]
    Timeout { runner: InstanceId, waiting_for: &'static str },
    #[error("spawn cancelled for runner {0}")]
    Cancelled(InstanceId),
}

/// Everything one worker needs to create a runner. Passed by value; workers
/// share no mutable state.
#[derive(Debug, Clone)]
pub struct SpawnRunnerConfig {
    pub identity: RunnerIdentity,
    pub vm_config: VmConfig,
    /// The pre-registered platform record, carrying the assigned runner ID.
    pub runner: PlatformRunner,
    pub context: RunnerContext,
    pub policy: PolicyKind,
}

/// Create one runner.
///
/// Prespawn workers return as soon as the VM exists; the next tick observes
/// it. Reactive workers wait for the platform to see the runner and then
/// for the job to be picked up, deleting the platform registration on
/// either timeout. Cancellation abandons polling without compensating
/// deletion; the next tick's cleanup reaps whatever was created.
pub async fn spawn_runner<P: PlatformPort, C: CloudPort>(
    platform: &P,
    cloud: &C,
    mut config: SpawnRunnerConfig,
    cancel: &CancellationToken,
) -> Result<InstanceId, SpawnError> {
    if config.identity.metadata.runner_id.is_none() {
        config.identity.metadata.runner_id =
            config.runner.runner_id().map(str::to_string);
    }
    let identity = config.identity.clone();
    let instance_id = identity.instance_id.clone();

    tracing::info!(
        runner = %instance_id,
        policy = ?config.policy,
        image = config.vm_config.image,
        flavor = config.vm_config.flavor,
        "spawning runner vm"
    );
    let vm = cloud.create_vm(&identity, &config.vm_config, &config.context).await?;
    tracing::info!(runner = %vm.instance_id, server_id = vm.server_id, "created vm");

    if config.policy != PolicyKind::Reactive {
        return Ok(instance_id);
    }

    let registration = wait_for(
        || platform.get_runner(&identity),
        RUNNER_REGISTRATION_TIMEOUT,
        PLATFORM_POLL_INTERVAL,
        true,
        cancel,
    )
    .await;
    handle_wait_outcome(platform, &identity, registration, "runner registration").await?;

    let pickup = wait_for(
        || platform.get_job(&identity),
        JOB_PICKUP_TIMEOUT,
        PLATFORM_POLL_INTERVAL,
        false,
        cancel,
    )
    .await;
    handle_wait_outcome(platform, &identity, pickup, "job pickup").await?;

    Ok(instance_id)
}

/// Map a wait result onto spawn semantics: timeouts compensate by deleting
/// the platform registration, cancellation leaves it for the next tick.
async fn handle_wait_outcome<P: PlatformPort, T>(
    platform: &P,
    identity: &RunnerIdentity,
    outcome: Result<T, WaitError>,
    waiting_for: &'static str,
) -> Result<T, SpawnError> {
    match outcome {
        Ok(value) => Ok(value),
        Err(WaitError::Timeout(_)) => {
            tracing::warn!(
                runner = %identity.instance_id,
                waiting_for,
                "deleting platform runner after wait timed out"
            );
            if let Err(error) = platform.delete_runner(identity).await {
                tracing::warn!(runner = %identity.instance_id, %error, "compensating delete failed");
            }
            Err(SpawnError::Timeout { runner: identity.instance_id.clone(), waiting_for })
        }
        Err(WaitError::Cancelled) => Err(SpawnError::Cancelled(identity.instance_id.clone())),
        Err(WaitError::Platform(error)) => Err(error.into()),
    }
}

/// Run spawn workers over the configs in a bounded pool; completion order
/// is unspecified. Failures are logged and skipped, successes returned.
pub async fn spawn_all<P: PlatformPort, C: CloudPort>(
    platform: &P,
    cloud: &C,
    configs: Vec<SpawnRunnerConfig>,
    cancel: &CancellationToken,
) -> Vec<InstanceId> {
    let pool = configs.len().min(SPAWN_POOL_MAX).max(1);
    stream::iter(configs)
        .map(|config| async move { spawn_runner(platform, cloud, config, cancel).await })
        .buffer_unordered(pool)
        .filter_map(|outcome| async move {
            match outcome {
                Ok(instance_id) => Some(instance_id),
                Err(error) => {
                    tracing::error!(%error, "failed to spawn a runner");
                    None
                }
            }
        })
        .collect()
        .await
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
