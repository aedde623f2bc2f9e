// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefix-scoped instance identifiers.
//!
//! An [`InstanceId`] is both the VM name in the cloud and the runner name on
//! the platform; name equality is the only link between the two systems.
//! Names look like `{prefix}-{suffix}` for prespawned instances and
//! `{prefix}-r-{suffix}` for reactive ones, where the suffix is a
//! lowercase-hex counter that only moves forward within a process.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Marker segment between prefix and suffix on reactive instances.
const REACTIVE_MARKER: &str = "r";

static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Hand out the next suffix value.
///
/// Seeded once from the wall clock in microseconds so names from a restarted
/// process do not collide with VMs still alive in the cloud; strictly
/// increasing afterwards, so IDs are never reused within a process lifetime.
fn next_suffix() -> u64 {
    if NEXT_SUFFIX.load(Ordering::Relaxed) == 0 {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let _ = NEXT_SUFFIX.compare_exchange(0, micros.max(1), Ordering::Relaxed, Ordering::Relaxed);
    }
    NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed)
}

/// Identifier for one runner VM and its platform registration.
#[derive(Debug, Clone, Eq)]
pub struct InstanceId {
    name: String,
    reactive: bool,
}

impl PartialEq for InstanceId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::hash::Hash for InstanceId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash only the name so it matches str::hash, which is required
        // for Borrow<str> map lookups.
        self.name.hash(state);
    }
}

impl Ord for InstanceId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl PartialOrd for InstanceId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl InstanceId {
    /// Synthesize a fresh ID under `prefix`.
    pub fn build(prefix: &str, reactive: bool) -> Self {
        let suffix = format!("{:x}", next_suffix());
        let name = if reactive {
            format!("{prefix}-{REACTIVE_MARKER}-{suffix}")
        } else {
            format!("{prefix}-{suffix}")
        };
        Self { name, reactive }
    }

    /// Reconstruct an ID from a name observed in the cloud or on the platform.
    ///
    /// Returns `None` when the name does not belong to `prefix`. The reactive
    /// flag is recovered from the marker segment.
    pub fn from_name(prefix: &str, name: &str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
        if rest.is_empty() {
            return None;
        }
        let reactive = rest
            .strip_prefix(REACTIVE_MARKER)
            .and_then(|r| r.strip_prefix('-'))
            .is_some_and(|r| !r.is_empty());
        Some(Self { name: name.to_string(), reactive })
    }

    /// Reconstruct an ID from a name that is already known to be ours.
    ///
    /// For callers that have prefix-filtered elsewhere (port adapters,
    /// deserialization). The reactive flag is recovered from the marker
    /// segment; the suffix never contains a dash, so the marker sits
    /// second-to-last.
    pub fn from_full_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut segments = name.rsplit('-');
        let _suffix = segments.next();
        let reactive = segments.next() == Some(REACTIVE_MARKER);
        Self { name, reactive }
    }

    /// Whether `name` belongs to the namespace owned by `prefix`.
    pub fn name_has_prefix(prefix: &str, name: &str) -> bool {
        name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('-'))
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The part after the prefix (and reactive marker, if present).
    pub fn suffix(&self) -> &str {
        self.name.rsplit('-').next().unwrap_or(&self.name)
    }

    pub fn is_reactive(&self) -> bool {
        self.reactive
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::borrow::Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.name
    }
}

impl PartialEq<str> for InstanceId {
    fn eq(&self, other: &str) -> bool {
        self.name == other
    }
}

impl PartialEq<&str> for InstanceId {
    fn eq(&self, other: &&str) -> bool {
        self.name == *other
    }
}

impl Serialize for InstanceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self::from_full_name(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
