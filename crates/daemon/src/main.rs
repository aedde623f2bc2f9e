// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rfd: drive the runner-fleet reconcile loop.
//!
//! This binary wires the simulated cloud and platform providers so the
//! loop, policies, and metrics can be exercised locally. Deployment builds
//! embed the rf-daemon library and supply real transports through the
//! rf-adapters seams.

use anyhow::Context;
use clap::Parser;
use rf_adapters::MemoryQueue;
use rf_core::SystemClock;
use rf_daemon::sim::{SimCloud, SimPlatform};
use rf_daemon::{config::Config, run_loop, telemetry, JsonlEventSink};
use rf_engine::{FleetMetrics, Reconciler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "rfd", about = "Runner-fleet reconcile daemon (simulated providers)")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "RFD_CONFIG", default_value = "rfd.toml")]
    config: PathBuf,

    /// Run a single reconcile tick and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let _log_guard = telemetry::init(config.manager.log_dir.as_deref());
    tracing::info!(
        manager = config.manager.name,
        algorithm = ?config.policy.algorithm,
        base_quantity = config.policy.base_quantity,
        "starting runner-fleet daemon"
    );

    let sink = JsonlEventSink::create(&config.events.log_path)
        .with_context(|| format!("opening {}", config.events.log_path.display()))?;
    let metrics = Arc::new(FleetMetrics::new().context("registering metrics")?);

    let queue = MemoryQueue::new();
    let reconciler = Reconciler::new(
        SimPlatform::default(),
        SimCloud::new(&config.manager.name),
        Some(queue),
        config.policy_config(),
        config.reconcile_config(),
        sink,
        metrics,
        SystemClock,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    if args.once {
        let report = reconciler.reconcile(&cancel).await?;
        tracing::info!(
            action = ?report.action,
            spawned = report.spawned.len(),
            deleted_vms = report.deleted_vm_ids.len(),
            "single tick complete"
        );
        return Ok(());
    }

    run_loop(&reconciler, config.reconcile_interval(), &cancel).await?;
    tracing::info!("daemon stopped");
    Ok(())
}
