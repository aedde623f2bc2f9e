// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform-side runner records and the health query response.

use crate::metadata::RunnerIdentity;
use serde::{Deserialize, Serialize};

/// A runner as registered on the CI platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRunner {
    pub identity: RunnerIdentity,
    pub online: bool,
    pub busy: bool,
    /// The platform asserts this entry may be reaped.
    pub deletable: bool,
    pub labels: Vec<String>,
}

impl PlatformRunner {
    pub fn is_offline_idle(&self) -> bool {
        !self.online && !self.busy
    }

    pub fn is_online_idle(&self) -> bool {
        self.online && !self.busy
    }

    /// Platform-assigned runner ID, when registration completed.
    pub fn runner_id(&self) -> Option<&str> {
        self.identity.metadata.runner_id.as_deref()
    }
}

/// Result of asking the platform about a specific set of runners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnersHealth {
    /// Runners we asked about that the platform knows.
    pub requested: Vec<PlatformRunner>,
    /// Runners the platform knows under our prefix but that we did not ask
    /// about (dangling platform entries).
    pub non_requested: Vec<PlatformRunner>,
    /// Runners we asked about for which the platform returned no data
    /// (transient).
    pub failed: Vec<RunnerIdentity>,
}

impl RunnersHealth {
    pub fn is_empty(&self) -> bool {
        self.requested.is_empty() && self.non_requested.is_empty() && self.failed.is_empty()
    }
}
