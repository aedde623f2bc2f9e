// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock polling primitive for the spawn worker's health loops.

use rf_adapters::PlatformError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled while waiting")]
    Cancelled,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Poll `op` every `interval` until it yields a value or `timeout` passes.
///
/// With `ignore_api_errors`, transient [`PlatformError::Api`] failures are
/// logged and treated like an empty poll; authentication errors always
/// propagate. Cancellation is honored at interval boundaries, never
/// mid-call.
pub async fn wait_for<T, F, Fut>(
    mut op: F,
    timeout: Duration,
    interval: Duration,
    ignore_api_errors: bool,
    cancel: &CancellationToken,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, PlatformError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match op().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(error) if ignore_api_errors && !error.is_auth() => {
                tracing::debug!(%error, "ignoring transient platform error while waiting");
            }
            Err(error) => return Err(error.into()),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(WaitError::Timeout(timeout));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(WaitError::Timeout(timeout));
        }
    }
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
