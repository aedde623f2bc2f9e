// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metric events emitted for completed runners.
//!
//! Events are appended as JSON lines to the configured event stream and
//! mirrored into Prometheus observations by the metrics pipeline.

use serde::{Deserialize, Serialize};

/// One lifecycle event extracted from a runner that is being deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricEvent {
    /// The runner VM finished installing and registered itself.
    RunnerInstalled {
        /// Epoch seconds at which installation finished.
        timestamp: f64,
        flavor: String,
        /// Seconds from VM creation to installation end.
        duration: f64,
    },
    /// The runner picked up a job.
    RunnerStart {
        /// Epoch seconds of the pre-job hook.
        timestamp: f64,
        flavor: String,
        workflow: String,
        repo: Option<String>,
        /// Seconds the runner sat idle between installation and pickup.
        idle: f64,
        /// Seconds the job waited upstream before being started, when known.
        queue_duration: Option<f64>,
    },
    /// The runner finished its job.
    RunnerStop {
        /// Epoch seconds of the post-job hook.
        timestamp: f64,
        flavor: String,
        workflow: String,
        repo: Option<String>,
        status: String,
        /// Seconds between the pre-job and post-job hooks.
        job_duration: f64,
    },
}

impl MetricEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MetricEvent::RunnerInstalled { .. } => "runner_installed",
            MetricEvent::RunnerStart { .. } => "runner_start",
            MetricEvent::RunnerStop { .. } => "runner_stop",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
