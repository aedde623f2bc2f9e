// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tick loop: drive the reconciler on an interval until shutdown.

use rf_adapters::{CloudPort, JobQueue, PlatformPort};
use rf_core::Clock;
use rf_engine::{EventSink, ReconcileError, Reconciler};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run reconcile ticks every `interval` until the token is cancelled.
///
/// Ticks never overlap; a tick that outruns the interval delays the next
/// one. Transient tick failures are logged and retried on the next
/// interval, the next tick being the ultimate retry mechanism. An
/// authentication failure stops the loop and surfaces to the caller.
pub async fn run_loop<P, C, Q, S, K>(
    reconciler: &Reconciler<P, C, Q, S, K>,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), ReconcileError>
where
    P: PlatformPort,
    C: CloudPort,
    Q: JobQueue,
    S: EventSink,
    K: Clock,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        match reconciler.reconcile(cancel).await {
            Ok(report) => {
                tracing::debug!(action = ?report.action, "tick finished");
            }
            Err(error @ ReconcileError::Auth(_)) => {
                tracing::error!(%error, "authentication failed, stopping the loop");
                return Err(error);
            }
            Err(ReconcileError::Cancelled) => return Ok(()),
            Err(error) => {
                tracing::warn!(%error, "reconcile tick failed, retrying next interval");
            }
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
