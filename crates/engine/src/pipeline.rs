// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics pipeline: map pulled per-VM metrics to lifecycle events,
//! Prometheus observations, and JSON-line event records.

use crate::extract::PulledMetrics;
use parking_lot::Mutex;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use rf_adapters::JobInfo;
use rf_core::MetricEvent;
use std::sync::Arc;

const MINUTE: f64 = 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;

/// Receives every issued metric event; the daemon appends them as JSON
/// lines for external aggregation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &MetricEvent);
}

/// Sink that keeps events in memory, for tests and the dev loop.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &MetricEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Process-wide Prometheus instruments, registered on one registry.
pub struct FleetMetrics {
    registry: Registry,
    pub spawn_duration: HistogramVec,
    pub idle_duration: HistogramVec,
    pub queue_duration: HistogramVec,
    pub job_duration: HistogramVec,
    pub delete_runner_duration: HistogramVec,
    pub delete_vm_duration: HistogramVec,
    pub deleted_runners: IntCounterVec,
    pub deleted_vms: IntCounterVec,
    pub dangling_runners: IntCounter,
    pub timed_out_runners: IntCounter,
}

impl FleetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let startup_buckets =
            vec![5.0, 10.0, 15.0, 30.0, MINUTE, 2.0 * MINUTE, 3.0 * MINUTE, 5.0 * MINUTE, 10.0 * MINUTE];
        let queue_buckets = vec![
            5.0,
            30.0,
            MINUTE,
            5.0 * MINUTE,
            10.0 * MINUTE,
            20.0 * MINUTE,
            30.0 * MINUTE,
            HOUR,
            2.0 * HOUR,
            5.0 * HOUR,
        ];
        let job_buckets = vec![
            MINUTE,
            5.0 * MINUTE,
            10.0 * MINUTE,
            20.0 * MINUTE,
            30.0 * MINUTE,
            60.0 * MINUTE,
            2.0 * HOUR,
            4.0 * HOUR,
            6.0 * HOUR,
            3.0 * DAY,
            5.0 * DAY,
        ];

        let histogram = |name: &str, help: &str, buckets: &[f64]| {
            HistogramVec::new(
                HistogramOpts::new(name, help).buckets(buckets.to_vec()),
                &["flavor"],
            )
        };

        let metrics = Self {
            spawn_duration: histogram(
                "runner_spawn_duration_seconds",
                "Time in seconds to initialize the VM and register the runner.",
                &startup_buckets,
            )?,
            idle_duration: histogram(
                "runner_idle_duration_seconds",
                "Time in seconds a runner waited idle for a job to be picked up.",
                &startup_buckets,
            )?,
            queue_duration: histogram(
                "runner_queue_duration_seconds",
                "Time in seconds a job waited upstream before starting.",
                &queue_buckets,
            )?,
            job_duration: histogram(
                "job_duration_seconds",
                "Time in seconds a job took to complete.",
                &job_buckets,
            )?,
            delete_runner_duration: histogram(
                "delete_runner_duration_seconds",
                "Time in seconds spent deleting platform runners per tick.",
                &startup_buckets,
            )?,
            delete_vm_duration: histogram(
                "delete_vm_duration_seconds",
                "Time in seconds spent deleting VMs per tick.",
                &startup_buckets,
            )?,
            deleted_runners: IntCounterVec::new(
                Opts::new("deleted_runners_total", "Platform runners deleted."),
                &["flavor"],
            )?,
            deleted_vms: IntCounterVec::new(
                Opts::new("deleted_vms_total", "Cloud VMs deleted."),
                &["flavor"],
            )?,
            dangling_runners: IntCounter::new(
                "dangling_runners_total",
                "Platform runners observed without a matching VM.",
            )?,
            timed_out_runners: IntCounter::new(
                "timed_out_runners_total",
                "Runners reaped after exceeding the maximum creation time.",
            )?,
            registry,
        };
        metrics.register_all()?;
        Ok(metrics)
    }

    fn register_all(&self) -> Result<(), prometheus::Error> {
        self.registry.register(Box::new(self.spawn_duration.clone()))?;
        self.registry.register(Box::new(self.idle_duration.clone()))?;
        self.registry.register(Box::new(self.queue_duration.clone()))?;
        self.registry.register(Box::new(self.job_duration.clone()))?;
        self.registry.register(Box::new(self.delete_runner_duration.clone()))?;
        self.registry.register(Box::new(self.delete_vm_duration.clone()))?;
        self.registry.register(Box::new(self.deleted_runners.clone()))?;
        self.registry.register(Box::new(self.deleted_vms.clone()))?;
        self.registry.register(Box::new(self.dangling_runners.clone()))?;
        self.registry.register(Box::new(self.timed_out_runners.clone()))?;
        Ok(())
    }

    /// The registry backing the exposition endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn with_flavor(&self, histogram: &HistogramVec, flavor: &str) -> Histogram {
        histogram.with_label_values(&[flavor])
    }
}

/// Issues lifecycle events for one manager ("flavor").
pub struct MetricsPipeline<S> {
    metrics: Arc<FleetMetrics>,
    sink: S,
    flavor: String,
}

impl<S: EventSink> MetricsPipeline<S> {
    pub fn new(metrics: Arc<FleetMetrics>, sink: S, flavor: impl Into<String>) -> Self {
        Self { metrics, sink, flavor: flavor.into() }
    }

    /// Issue the events for one runner's pulled metrics. Returns the names
    /// of the events issued.
    pub fn issue(&self, pulled: &PulledMetrics, job: Option<&JobInfo>) -> Vec<&'static str> {
        let mut issued = Vec::new();
        let runner = &pulled.vm.instance_id;
        let created_at = pulled.vm.created_at.timestamp() as f64;

        if let Some(installed_ts) = pulled.installed_ts {
            let duration = clamp_duration(runner, "spawn duration", installed_ts - created_at);
            self.emit(
                MetricEvent::RunnerInstalled {
                    timestamp: installed_ts,
                    flavor: self.flavor.clone(),
                    duration,
                },
                &mut issued,
            );
            self.metrics.with_flavor(&self.metrics.spawn_duration, &self.flavor).observe(duration);
        }

        let Some(pre_job) = &pulled.pre_job else {
            if pulled.post_job.is_some() {
                // Post-job without pre-job cannot happen in a healthy
                // runner; contact developers.
                tracing::error!(
                    %runner,
                    "post-job metrics present without pre-job metrics, skipping stop event"
                );
            } else {
                tracing::debug!(%runner, "no pre-job metrics, runner never picked up a job");
            }
            return issued;
        };

        let idle = match pulled.installed_ts {
            Some(installed_ts) => {
                clamp_duration(runner, "idle duration", pre_job.timestamp - installed_ts)
            }
            None => 0.0,
        };
        let queue_duration = job.and_then(|job| job.queue_duration).map(|duration| {
            let clamped = clamp_duration(runner, "queue duration", duration);
            self.metrics.with_flavor(&self.metrics.queue_duration, &self.flavor).observe(clamped);
            clamped
        });
        self.emit(
            MetricEvent::RunnerStart {
                timestamp: pre_job.timestamp,
                flavor: self.flavor.clone(),
                workflow: pre_job.workflow.clone(),
                repo: pre_job.repository.clone(),
                idle,
                queue_duration,
            },
            &mut issued,
        );
        self.metrics.with_flavor(&self.metrics.idle_duration, &self.flavor).observe(idle);

        // A missing post-job with a present pre-job is a valid terminal
        // state: the runner crashed mid-job. No stop event is fabricated.
        if let Some(post_job) = &pulled.post_job {
            let job_duration =
                clamp_duration(runner, "job duration", post_job.timestamp - pre_job.timestamp);
            self.emit(
                MetricEvent::RunnerStop {
                    timestamp: post_job.timestamp,
                    flavor: self.flavor.clone(),
                    workflow: pre_job.workflow.clone(),
                    repo: pre_job.repository.clone(),
                    status: post_job.status.clone(),
                    job_duration,
                },
                &mut issued,
            );
            self.metrics.with_flavor(&self.metrics.job_duration, &self.flavor).observe(job_duration);
        }

        issued
    }

    fn emit(&self, event: MetricEvent, issued: &mut Vec<&'static str>) {
        tracing::debug!(event = event.name(), "issuing runner metric event");
        self.sink.emit(&event);
        issued.push(event.name());
    }
}

fn clamp_duration(runner: &rf_core::InstanceId, what: &str, value: f64) -> f64 {
    if value < 0.0 {
        tracing::warn!(%runner, what, value, "negative duration clamped to zero");
        0.0
    } else {
        value
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
