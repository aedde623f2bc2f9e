// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rf-engine: The reconciliation and lifecycle engine.
//!
//! One tick reads the joint state of cloud VMs and platform runners, plans
//! cleanup, extracts metrics from VMs about to die, executes deletions,
//! and hands the surviving state to the active scheduling policy, which
//! either spawns runners through a bounded worker pool or downscales.

pub mod extract;
pub mod inventory;
pub mod pipeline;
pub mod planner;
pub mod policy;
pub mod reconciler;
pub mod spawn;
pub mod wait;

pub use extract::{PostJobMetrics, PreJobMetrics, PulledMetrics};
pub use inventory::Inventory;
pub use pipeline::{EventSink, FleetMetrics, MemorySink, MetricsPipeline};
pub use planner::{CleanupPlan, FlushMode};
pub use policy::{
    Action, ActionPlan, PolicyConfig, PolicyError, PolicyKind, PrespawnConfig, ReactiveConfig,
};
pub use reconciler::{ReconcileConfig, ReconcileError, Reconciler, TickReport};
pub use spawn::{SpawnError, SpawnRunnerConfig};
pub use wait::{wait_for, WaitError};
