// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup and the JSON-lines metric event log.

use parking_lot::Mutex;
use rf_core::MetricEvent;
use rf_engine::EventSink;
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default level.
///
/// With a log directory, output goes to a daily-rolled file through a
/// non-blocking writer; the returned guard must live until shutdown so
/// buffered lines are flushed.
pub fn init(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rfd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Appends every metric event as one JSON line, for external aggregation.
pub struct JsonlEventSink {
    file: Mutex<std::fs::File>,
}

impl JsonlEventSink {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&self, event: &MetricEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(%error, "unable to serialize metric event");
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(error) = writeln!(file, "{line}") {
            tracing::warn!(%error, "unable to append metric event");
        }
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
