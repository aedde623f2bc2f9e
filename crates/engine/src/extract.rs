// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric extraction from VMs that are about to be deleted.
//!
//! Pulls the three well-known metric files over SSH with a hard size cap
//! and parses them tolerantly: a corrupt or missing file nulls that field
//! only. The extractor never mutates cloud or platform state.

use futures_util::stream::{self, StreamExt};
use rf_adapters::{CloudPort, SshSession};
use rf_core::{InstanceId, RunnerIdentity, Vm};
use serde::Deserialize;
use std::time::Duration;

/// Reject metric files larger than this many bytes.
pub const MAX_METRICS_FILE_SIZE: u64 = 1024;

/// Remote path of the runner-installed timestamp.
pub const RUNNER_INSTALLED_TS_FILE: &str = "/home/runner/runner-installed.timestamp";
/// Remote path of the pre-job metrics file.
pub const PRE_JOB_METRICS_FILE: &str = "/home/runner/metrics/pre-job-metrics.json";
/// Remote path of the post-job metrics file.
pub const POST_JOB_METRICS_FILE: &str = "/home/runner/metrics/post-job-metrics.json";

const SSH_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const FILE_PULL_TIMEOUT: Duration = Duration::from_secs(60);
const EXTRACT_POOL_MAX: usize = 30;

/// Written by the runner's pre-job hook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreJobMetrics {
    pub timestamp: f64,
    pub workflow: String,
    pub repository: Option<String>,
    pub event: String,
}

/// Written by the runner's post-job hook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostJobMetrics {
    pub timestamp: f64,
    pub status: String,
    pub status_info: Option<serde_json::Value>,
}

/// Everything pulled from one VM; present iff at least one field parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledMetrics {
    pub vm: Vm,
    pub installed_ts: Option<f64>,
    pub pre_job: Option<PreJobMetrics>,
    pub post_job: Option<PostJobMetrics>,
}

impl PulledMetrics {
    pub fn identity(&self) -> RunnerIdentity {
        RunnerIdentity::new(self.vm.instance_id.clone(), self.vm.metadata.clone())
    }
}

/// Pull metrics from the given VMs in a bounded pool. Failures are logged
/// per VM and never abort the others.
pub async fn extract_metrics<C: CloudPort>(cloud: &C, ids: &[InstanceId]) -> Vec<PulledMetrics> {
    if ids.is_empty() {
        return Vec::new();
    }
    let pool = ids.len().min(EXTRACT_POOL_MAX);
    stream::iter(ids.iter().cloned())
        .map(|id| async move { extract_one(cloud, id).await })
        .buffer_unordered(pool)
        .filter_map(|pulled| async move { pulled })
        .collect()
        .await
}

async fn extract_one<C: CloudPort>(cloud: &C, id: InstanceId) -> Option<PulledMetrics> {
    let identity = RunnerIdentity::new(id.clone(), Default::default());
    let vm = match cloud.get_vm(&identity).await {
        Ok(Some(vm)) => vm,
        Ok(None) => {
            tracing::warn!(runner = %id, "skipping metric extraction, vm not found");
            return None;
        }
        Err(error) => {
            tracing::warn!(runner = %id, %error, "skipping metric extraction, vm lookup failed");
            return None;
        }
    };

    let mut session = match cloud.ssh_connection(&vm).await {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(runner = %id, %error, "unable to open ssh session for metrics");
            return None;
        }
    };

    let installed_raw = pull_file(session.as_mut(), &id, RUNNER_INSTALLED_TS_FILE).await;
    let pre_job_raw = pull_file(session.as_mut(), &id, PRE_JOB_METRICS_FILE).await;
    let post_job_raw = pull_file(session.as_mut(), &id, POST_JOB_METRICS_FILE).await;

    let installed_ts = installed_raw.and_then(|raw| match raw.trim().parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(runner = %id, raw, "corrupt runner-installed timestamp");
            None
        }
    });
    let pre_job = pre_job_raw.and_then(|raw| parse_json::<PreJobMetrics>(&id, "pre-job", &raw));
    let post_job =
        post_job_raw.and_then(|raw| parse_json::<PostJobMetrics>(&id, "post-job", &raw));

    if installed_ts.is_none() && pre_job.is_none() && post_job.is_none() {
        tracing::warn!(runner = %id, "no metrics pulled");
        return None;
    }
    Some(PulledMetrics { vm, installed_ts, pre_job, post_job })
}

/// Pull one remote file: stat its size, enforce the cap, then download
/// through a size-bounded sink. Returns `None` on any failure.
async fn pull_file(
    session: &mut dyn SshSession,
    id: &InstanceId,
    remote_path: &str,
) -> Option<String> {
    let stat = format!("stat -c %s {remote_path}");
    let output = match session.run(&stat, SSH_COMMAND_TIMEOUT).await {
        Ok(output) => output,
        Err(error) => {
            tracing::warn!(runner = %id, remote_path, %error, "stat failed");
            return None;
        }
    };
    if !output.success() {
        tracing::warn!(
            runner = %id,
            remote_path,
            exit_code = output.exit_code,
            stderr = output.stderr,
            "unable to get file size"
        );
        return None;
    }
    let size: u64 = match output.stdout.trim().parse() {
        Ok(size) => size,
        Err(_) => {
            tracing::warn!(runner = %id, remote_path, stdout = output.stdout, "invalid file size");
            return None;
        }
    };
    if size > MAX_METRICS_FILE_SIZE {
        tracing::warn!(runner = %id, remote_path, size, "metric file too large, not pulling");
        return None;
    }

    let bytes = match session.download(remote_path, MAX_METRICS_FILE_SIZE, FILE_PULL_TIMEOUT).await
    {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(runner = %id, remote_path, %error, "file pull failed");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(content) => Some(content),
        Err(_) => {
            tracing::warn!(runner = %id, remote_path, "metric file is not valid utf-8");
            None
        }
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(id: &InstanceId, kind: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(runner = %id, kind, %error, raw, "corrupt metrics file");
            None
        }
    }
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
