// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One reconcile tick: inventory → cleanup → metrics → deletion → policy →
//! spawn or downscale.
//!
//! Ordering within a tick is strict: cleanup is planned before metrics are
//! extracted from the to-be-deleted set, extraction happens before
//! deletion, deletion before spawn dispatch. Cancellation is checked
//! between stages; in-flight external calls are never interrupted, and the
//! next tick reconciles whatever partial work remains.

use crate::extract::{extract_metrics, PulledMetrics};
use crate::inventory::Inventory;
use crate::pipeline::{EventSink, FleetMetrics, MetricsPipeline};
use crate::planner::{self, max_creation_time};
use crate::policy::{
    plan_prespawn, plan_reactive, Action, ActionPlan, PolicyConfig, PolicyError, PolicyKind,
};
use crate::spawn::{spawn_all, SpawnRunnerConfig};
use rf_adapters::{CloudError, CloudPort, JobQueue, PlatformError, PlatformPort, QueueError};
use rf_core::{Clock, InstanceId, RunnerIdentity, RunnerMetadata, VmConfig};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("platform authentication failed: {0}")]
    Auth(#[source] PlatformError),
    #[error(transparent)]
    Platform(PlatformError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("reactive policy configured without a job queue")]
    MissingQueue,
    #[error("reconcile tick cancelled")]
    Cancelled,
}

impl ReconcileError {
    fn from_platform(error: PlatformError) -> Self {
        if error.is_auth() {
            ReconcileError::Auth(error)
        } else {
            ReconcileError::Platform(error)
        }
    }
}

impl From<PolicyError> for ReconcileError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::Platform(error) => ReconcileError::from_platform(error),
            PolicyError::Queue(error) => error.into(),
        }
    }
}

/// Identity and labels of this manager.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Unique manager name; also the Prometheus flavor label.
    pub manager_name: String,
    /// Labels attached to every runner this manager registers.
    pub labels: Vec<String>,
}

/// What one tick did; consumed by logs and tests.
#[derive(Debug, Default)]
pub struct TickReport {
    pub action: Option<Action>,
    pub deleted_runner_ids: Vec<String>,
    pub deleted_vm_ids: Vec<InstanceId>,
    pub spawned: Vec<InstanceId>,
    pub events_issued: usize,
}

/// The reconciliation engine. Holds the ports for the process lifetime and
/// owns no other state: every tick rebuilds its view from the cloud and
/// the platform.
pub struct Reconciler<P, C, Q, S, K> {
    platform: P,
    cloud: C,
    queue: Option<Q>,
    policy: PolicyConfig,
    config: ReconcileConfig,
    pipeline: MetricsPipeline<S>,
    metrics: Arc<FleetMetrics>,
    clock: K,
}

impl<P, C, Q, S, K> Reconciler<P, C, Q, S, K>
where
    P: PlatformPort,
    C: CloudPort,
    Q: JobQueue,
    S: EventSink,
    K: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: P,
        cloud: C,
        queue: Option<Q>,
        policy: PolicyConfig,
        config: ReconcileConfig,
        sink: S,
        metrics: Arc<FleetMetrics>,
        clock: K,
    ) -> Self {
        let pipeline = MetricsPipeline::new(metrics.clone(), sink, config.manager_name.clone());
        Self { platform, cloud, queue, policy, config, pipeline, metrics, clock }
    }

    /// Run a single reconcile iteration.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<TickReport, ReconcileError> {
        let mut report = TickReport::default();

        // Stage 1: read the joint state.
        let vms = self.cloud.list_vms().await?;
        let identities: Vec<RunnerIdentity> = vms
            .iter()
            .map(|vm| RunnerIdentity::new(vm.instance_id.clone(), vm.metadata.clone()))
            .collect();
        let health = self
            .platform
            .get_runners_health(&identities)
            .await
            .map_err(ReconcileError::from_platform)?;
        ensure_live(cancel)?;

        // Stage 2: join and classify.
        let inventory = Inventory::build(vms, health);
        tracing::debug!(
            vms = inventory.vms.len(),
            requested = inventory.requested.len(),
            dangling = inventory.dangling.len(),
            failed = inventory.failed.len(),
            "built inventory"
        );

        // Stage 3: plan cleanup.
        let plan = planner::plan(&inventory, max_creation_time(), self.clock.now_utc());
        self.metrics.dangling_runners.inc_by(plan.dangling as u64);
        self.metrics.timed_out_runners.inc_by(plan.timed_out as u64);
        ensure_live(cancel)?;

        // Stage 4: pull metrics from VMs about to die.
        let vm_ids: Vec<InstanceId> = plan.vm_ids.iter().cloned().collect();
        let pulled = extract_metrics(&self.cloud, &vm_ids).await;
        ensure_live(cancel)?;

        // Stage 5: execute deletions, then let the cloud reap orphaned
        // keypairs.
        let runner_ids: Vec<String> = plan.runner_ids.iter().cloned().collect();
        report.deleted_runner_ids = self.delete_runners(&runner_ids).await?;
        report.deleted_vm_ids = self.delete_vms(&vm_ids).await;
        if let Err(error) = self.cloud.cleanup().await {
            tracing::warn!(%error, "cloud cleanup failed");
        }
        ensure_live(cancel)?;

        // Stage 6: issue metric events for what was extracted.
        report.events_issued = self.issue_events(&pulled).await;

        // Stage 7: the surviving pool.
        let surviving: BTreeSet<&InstanceId> = inventory
            .vms
            .keys()
            .filter(|id| !report.deleted_vm_ids.contains(*id))
            .collect();
        ensure_live(cancel)?;

        // Stage 8: dispatch to the configured policy.
        let action_plan = match &self.policy {
            PolicyConfig::Prespawn(config) => plan_prespawn(config, surviving.len()),
            PolicyConfig::Reactive(config) => {
                let queue = self.queue.as_ref().ok_or(ReconcileError::MissingQueue)?;
                plan_reactive(
                    config,
                    surviving.len(),
                    queue,
                    &self.platform,
                    self.cloud.name_prefix(),
                    &self.config.labels,
                )
                .await?
            }
        };
        report.action = Some(action_plan.action());
        ensure_live(cancel)?;

        // Stage 9: act.
        match action_plan {
            ActionPlan::Prespawn { action: Action::Create, quantity } => {
                let configs = self.build_prespawn_configs(quantity).await?;
                report.spawned = spawn_all(&self.platform, &self.cloud, configs, cancel).await;
            }
            ActionPlan::Reactive { action: Action::Create, configs } => {
                report.spawned = spawn_all(&self.platform, &self.cloud, configs, cancel).await;
            }
            ActionPlan::Prespawn { action: Action::Downscale(quantity), .. }
            | ActionPlan::Reactive { action: Action::Downscale(quantity), .. } => {
                self.downscale(quantity, &inventory, &mut report).await?;
            }
            _ => {}
        }

        tracing::info!(
            action = ?report.action,
            deleted_runners = report.deleted_runner_ids.len(),
            deleted_vms = report.deleted_vm_ids.len(),
            spawned = report.spawned.len(),
            events = report.events_issued,
            "reconcile tick complete"
        );
        Ok(report)
    }

    /// Delete platform runners with timing and counters. API failures are
    /// contained; authentication failures abort the tick.
    async fn delete_runners(&self, runner_ids: &[String]) -> Result<Vec<String>, ReconcileError> {
        if runner_ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!(count = runner_ids.len(), "deleting platform runners");
        let started = Instant::now();
        let deleted = match self.platform.delete_runners(runner_ids).await {
            Ok(deleted) => deleted,
            Err(error) if error.is_auth() => return Err(ReconcileError::Auth(error)),
            Err(error) => {
                tracing::warn!(%error, "platform runner deletion failed");
                Vec::new()
            }
        };
        let flavor = self.config.manager_name.as_str();
        self.metrics.deleted_runners.with_label_values(&[flavor]).inc_by(deleted.len() as u64);
        self.metrics
            .delete_runner_duration
            .with_label_values(&[flavor])
            .observe(started.elapsed().as_secs_f64());
        Ok(deleted)
    }

    /// Delete VMs with timing and counters; failures are contained.
    async fn delete_vms(&self, vm_ids: &[InstanceId]) -> Vec<InstanceId> {
        if vm_ids.is_empty() {
            return Vec::new();
        }
        tracing::info!(count = vm_ids.len(), "deleting vms");
        let started = Instant::now();
        let deleted = match self.cloud.delete_vms(vm_ids).await {
            Ok(deleted) => deleted,
            Err(error) => {
                tracing::warn!(%error, "vm deletion failed");
                Vec::new()
            }
        };
        let flavor = self.config.manager_name.as_str();
        self.metrics.deleted_vms.with_label_values(&[flavor]).inc_by(deleted.len() as u64);
        self.metrics
            .delete_vm_duration
            .with_label_values(&[flavor])
            .observe(started.elapsed().as_secs_f64());
        deleted
    }

    /// Issue events for pulled metrics, fetching job details best-effort
    /// for runners that ran a job.
    async fn issue_events(&self, pulled: &[PulledMetrics]) -> usize {
        let mut issued = 0;
        for metrics in pulled {
            let job = if metrics.pre_job.is_some() {
                match self.platform.get_job(&metrics.identity()).await {
                    Ok(job) => job,
                    Err(error) => {
                        tracing::warn!(
                            runner = %metrics.vm.instance_id,
                            %error,
                            "unable to fetch job details for metrics"
                        );
                        None
                    }
                }
            } else {
                None
            };
            issued += self.pipeline.issue(metrics, job.as_ref()).len();
        }
        issued
    }

    /// Register and spawn `quantity` prespawned runners. A registration
    /// failure skips that runner; its siblings continue.
    async fn build_prespawn_configs(
        &self,
        quantity: usize,
    ) -> Result<Vec<SpawnRunnerConfig>, ReconcileError> {
        let PolicyConfig::Prespawn(config) = &self.policy else {
            return Ok(Vec::new());
        };
        tracing::info!(quantity, "creating prespawned runners");
        let mut configs = Vec::with_capacity(quantity);
        for _ in 0..quantity {
            let instance_id = InstanceId::build(self.cloud.name_prefix(), false);
            let identity = RunnerIdentity::new(instance_id, RunnerMetadata::default());
            match self.platform.get_runner_context(&identity, &self.config.labels).await {
                Ok((context, runner)) => configs.push(SpawnRunnerConfig {
                    identity,
                    vm_config: VmConfig {
                        image: config.vm_image.clone(),
                        flavor: config.vm_flavor.clone(),
                    },
                    runner,
                    context,
                    policy: PolicyKind::Prespawn,
                }),
                Err(error) if error.is_auth() => return Err(ReconcileError::Auth(error)),
                Err(error) => {
                    tracing::warn!(%error, "runner registration failed, skipping one spawn");
                }
            }
        }
        Ok(configs)
    }

    /// Scale the pool down by `quantity`, preferring deletable over idle
    /// over busy. VMs are only deleted for runners the platform actually
    /// let go of, so a runner that grabbed a job in the meantime keeps its
    /// VM.
    async fn downscale(
        &self,
        quantity: usize,
        inventory: &Inventory,
        report: &mut TickReport,
    ) -> Result<(), ReconcileError> {
        let already_deleted: BTreeSet<&str> =
            report.deleted_runner_ids.iter().map(String::as_str).collect();
        let deleted_vm_ids: BTreeSet<&InstanceId> = report.deleted_vm_ids.iter().collect();
        let candidates = inventory.requested.values().filter(|runner| {
            runner.runner_id().is_some_and(|id| !already_deleted.contains(id))
                && !deleted_vm_ids.contains(&runner.identity.instance_id)
        });
        let selected: Vec<String> =
            planner::select_downscale(candidates, quantity).into_iter().collect();
        if selected.is_empty() {
            return Ok(());
        }
        tracing::info!(count = selected.len(), "downscaling runners");

        let deleted = self.delete_runners(&selected).await?;
        let vm_ids: Vec<InstanceId> = inventory
            .vms
            .values()
            .filter(|vm| {
                vm.metadata
                    .runner_id
                    .as_deref()
                    .is_some_and(|id| deleted.iter().any(|deleted_id| deleted_id == id))
            })
            .map(|vm| vm.instance_id.clone())
            .collect();

        let pulled = extract_metrics(&self.cloud, &vm_ids).await;
        let deleted_vms = self.delete_vms(&vm_ids).await;
        report.events_issued += self.issue_events(&pulled).await;
        report.deleted_runner_ids.extend(deleted);
        report.deleted_vm_ids.extend(deleted_vms);
        Ok(())
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), ReconcileError> {
    if cancel.is_cancelled() {
        Err(ReconcileError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
