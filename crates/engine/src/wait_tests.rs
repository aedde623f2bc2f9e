// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the polling primitive.

use super::*;
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn returns_first_truthy_value() {
    let polls = Arc::new(Mutex::new(0u32));
    let cancel = CancellationToken::new();
    let result = wait_for(
        || {
            let polls = polls.clone();
            async move {
                let mut count = polls.lock();
                *count += 1;
                Ok(if *count >= 3 { Some("ready") } else { None })
            }
        },
        Duration::from_secs(600),
        Duration::from_secs(60),
        false,
        &cancel,
    )
    .await;

    assert_eq!(result.unwrap(), "ready");
    assert_eq!(*polls.lock(), 3);
}

#[tokio::test(start_paused = true)]
async fn times_out_when_value_never_appears() {
    let polls = Arc::new(Mutex::new(0u32));
    let cancel = CancellationToken::new();
    let result: Result<(), WaitError> = wait_for(
        || {
            let polls = polls.clone();
            async move {
                *polls.lock() += 1;
                Ok(None)
            }
        },
        Duration::from_secs(600),
        Duration::from_secs(60),
        false,
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(WaitError::Timeout(_))));
    // Polls run at t=0, 60, ..., 540: the deadline is not overshot.
    assert!(*polls.lock() >= 10);
}

#[tokio::test(start_paused = true)]
async fn absorbs_api_errors_when_asked() {
    let polls = Arc::new(Mutex::new(0u32));
    let cancel = CancellationToken::new();
    let result = wait_for(
        || {
            let polls = polls.clone();
            async move {
                let mut count = polls.lock();
                *count += 1;
                if *count < 3 {
                    Err(PlatformError::Api("flaky".into()))
                } else {
                    Ok(Some(*count))
                }
            }
        },
        Duration::from_secs(600),
        Duration::from_secs(60),
        true,
        &cancel,
    )
    .await;

    assert_eq!(result.unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn api_errors_propagate_without_the_flag() {
    let cancel = CancellationToken::new();
    let result: Result<(), WaitError> = wait_for(
        || async { Err(PlatformError::Api("down".into())) },
        Duration::from_secs(600),
        Duration::from_secs(60),
        false,
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(WaitError::Platform(PlatformError::Api(_)))));
}

#[tokio::test(start_paused = true)]
async fn auth_errors_always_propagate() {
    let cancel = CancellationToken::new();
    let result: Result<(), WaitError> = wait_for(
        || async { Err(PlatformError::Auth("bad token".into())) },
        Duration::from_secs(600),
        Duration::from_secs(60),
        true,
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(WaitError::Platform(PlatformError::Auth(_)))));
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_observed_at_interval_boundaries() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result: Result<(), WaitError> = wait_for(
        || async { Ok(None) },
        Duration::from_secs(600),
        Duration::from_secs(60),
        false,
        &cancel,
    )
    .await;

    assert!(matches!(result, Err(WaitError::Cancelled)));
}
