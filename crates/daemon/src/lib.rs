// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rf-daemon: Process harness for the runner-fleet reconciler.
//!
//! Owns configuration loading and validation, telemetry setup, the metric
//! event log, and the tick loop that drives [`rf_engine::Reconciler`] on an
//! interval until shutdown. Deployments embed this library and plug their
//! cloud and platform transports into the adapter seams; the `rfd` binary
//! wires the simulated fleet for local evaluation.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod run;
pub mod sim;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use run::run_loop;
pub use telemetry::JsonlEventSink;
