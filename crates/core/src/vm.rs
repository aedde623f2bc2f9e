// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud-side VM records.

use crate::id::InstanceId;
use crate::metadata::RunnerMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloud server state as reported by the compute API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmState {
    Build,
    Active,
    Shutoff,
    Error,
    Unknown,
}

impl VmState {
    /// Map a raw cloud status string; anything unrecognized is `Unknown`.
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "BUILD" => VmState::Build,
            "ACTIVE" => VmState::Active,
            "SHUTOFF" => VmState::Shutoff,
            "ERROR" => VmState::Error,
            _ => VmState::Unknown,
        }
    }
}

/// A VM observed in the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    pub instance_id: InstanceId,
    pub metadata: RunnerMetadata,
    pub created_at: DateTime<Utc>,
    pub state: VmState,
    pub addresses: Vec<String>,
    /// Opaque server ID assigned by the cloud.
    pub server_id: String,
}

impl Vm {
    /// Age of the VM relative to `now`; zero when the clock reads earlier
    /// than the creation timestamp.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > max_age
    }
}

/// Image and flavor a spawn worker passes to VM creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub image: String,
    pub flavor: String,
}

#[cfg(test)]
#[path = "vm_tests.rs"]
mod tests;
