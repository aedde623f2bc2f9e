// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rf-adapters: Ports to the external systems the reconciler drives.
//!
//! The engine only sees the traits defined here: [`PlatformPort`] for the CI
//! platform, [`CloudPort`] for the VM cloud, [`JobQueue`] for the reactive
//! job queue, and the SSH seam used for metric extraction. The `openstack`
//! module layers the keypair / security-group / unique-name protocol on top
//! of a minimal compute-API seam; concrete transports stay behind that seam.

pub mod cloud;
pub mod openstack;
pub mod platform;
pub mod queue;
pub mod ssh;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use cloud::{CloudError, CloudPort, KeyfileError};
pub use platform::{JobInfo, PlatformError, PlatformPort};
pub use queue::{JobQueue, MemoryQueue, QueueError, QueueMessage, END_PROCESSING_PAYLOAD};
pub use ssh::{CommandOutput, SshError, SshFactory, SshSession};
