// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling policies: maintain a prespawned base pool, or drain the
//! reactive job queue into concrete spawn configs.

use crate::spawn::SpawnRunnerConfig;
use rf_adapters::{
    JobQueue, PlatformError, PlatformPort, QueueError, QueueMessage, END_PROCESSING_PAYLOAD,
};
use rf_core::{InstanceId, JobRequest, RunnerIdentity, VmConfig};
use std::collections::BTreeSet;
use std::time::Duration;

/// How long one queue get may block.
const QUEUE_GET_TIMEOUT: Duration = Duration::from_secs(30);

/// Which reconciliation algorithm a runner belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Prespawn,
    Reactive,
}

/// Maintain a constant pool of `base_quantity` idle runners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrespawnConfig {
    pub base_quantity: usize,
    pub vm_image: String,
    pub vm_flavor: String,
}

/// Consume the job queue, bounded by `base_quantity` concurrent runners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactiveConfig {
    pub base_quantity: usize,
    pub vm_image: String,
    pub vm_flavor: String,
    pub supported_labels: BTreeSet<String>,
}

/// The configured policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfig {
    Prespawn(PrespawnConfig),
    Reactive(ReactiveConfig),
}

impl PolicyConfig {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyConfig::Prespawn(_) => PolicyKind::Prespawn,
            PolicyConfig::Reactive(_) => PolicyKind::Reactive,
        }
    }
}

/// What a policy decided this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Downscale(usize),
    Noop,
}

/// Tagged action plan so the reconciler dispatch is exhaustive.
#[derive(Debug)]
pub enum ActionPlan {
    Prespawn { action: Action, quantity: usize },
    Reactive { action: Action, configs: Vec<SpawnRunnerConfig> },
}

impl ActionPlan {
    pub fn action(&self) -> Action {
        match self {
            ActionPlan::Prespawn { action, .. } | ActionPlan::Reactive { action, .. } => *action,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Prespawn: diff the surviving pool against the configured base quantity.
pub fn plan_prespawn(config: &PrespawnConfig, surviving: usize) -> ActionPlan {
    let base = config.base_quantity as i64;
    let diff = base - surviving as i64;
    if diff == 0 {
        ActionPlan::Prespawn { action: Action::Noop, quantity: 0 }
    } else if diff > 0 {
        ActionPlan::Prespawn { action: Action::Create, quantity: diff as usize }
    } else {
        ActionPlan::Prespawn { action: Action::Downscale(-diff as usize), quantity: 0 }
    }
}

/// Reactive: drain up to `min(base_quantity - surviving, queue_len)`
/// messages, registering a runner for each valid job request.
///
/// Malformed payloads and unsupported labels are rejected without requeue.
/// Messages turned into spawn configs are acked here: the job URL is the
/// authoritative handle and duplicate spawns are worse than a dropped one.
pub async fn plan_reactive<P: PlatformPort, Q: JobQueue>(
    config: &ReactiveConfig,
    surviving: usize,
    queue: &Q,
    platform: &P,
    prefix: &str,
    labels: &[String],
) -> Result<ActionPlan, PolicyError> {
    let queue_len = queue.size().await?;
    if queue_len == 0 {
        return Ok(ActionPlan::Reactive { action: Action::Noop, configs: Vec::new() });
    }

    let diff = config.base_quantity as i64 - surviving as i64;
    let want = diff.min(queue_len as i64);
    if want == 0 {
        return Ok(ActionPlan::Reactive { action: Action::Noop, configs: Vec::new() });
    }
    if want < 0 {
        return Ok(ActionPlan::Reactive {
            action: Action::Downscale(-want as usize),
            configs: Vec::new(),
        });
    }

    let mut configs = Vec::new();
    for _ in 0..want {
        let Some(message) = queue.get(QUEUE_GET_TIMEOUT).await? else {
            break;
        };
        if message.payload == END_PROCESSING_PAYLOAD {
            queue.ack(&message).await?;
            break;
        }
        match build_spawn_config(config, platform, prefix, labels, &message).await? {
            Some(spawn_config) => {
                queue.ack(&message).await?;
                configs.push(spawn_config);
            }
            None => {
                queue.reject(&message, false).await?;
            }
        }
    }
    Ok(ActionPlan::Reactive { action: Action::Create, configs })
}

/// Validate one queue message and register its runner. `Ok(None)` means the
/// message is invalid and must be rejected without requeue.
async fn build_spawn_config<P: PlatformPort>(
    config: &ReactiveConfig,
    platform: &P,
    prefix: &str,
    labels: &[String],
    message: &QueueMessage,
) -> Result<Option<SpawnRunnerConfig>, PolicyError> {
    let job = match JobRequest::parse(&message.payload) {
        Ok(job) => job,
        Err(error) => {
            tracing::warn!(%error, "rejecting malformed job request");
            return Ok(None);
        }
    };
    if !job.labels.iter().all(|label| config.supported_labels.contains(label)) {
        tracing::warn!(
            labels = ?job.labels,
            "rejecting job request with unsupported labels"
        );
        return Ok(None);
    }
    let metadata = match job.derive_metadata() {
        Ok(metadata) => metadata,
        Err(error) => {
            tracing::warn!(%error, "rejecting job request with unrecognized url");
            return Ok(None);
        }
    };

    let instance_id = InstanceId::build(prefix, true);
    let identity = RunnerIdentity::new(instance_id, metadata);
    let (context, runner) = platform.get_runner_context(&identity, labels).await?;
    Ok(Some(SpawnRunnerConfig {
        identity,
        vm_config: VmConfig { image: config.vm_image.clone(), flavor: config.vm_flavor.clone() },
        runner,
        context,
        policy: PolicyKind::Reactive,
    }))
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
