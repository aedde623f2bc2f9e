// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: one TOML file, validated on load.

use rf_engine::{PolicyConfig, PrespawnConfig, ReactiveConfig, ReconcileConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which reconciliation algorithm the manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Prespawn,
    Reactive,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerSection {
    /// Unique manager name; prefixes every cloud and platform resource.
    pub name: String,
    /// Labels attached to registered runners.
    pub labels: Vec<String>,
    /// Seconds between reconcile ticks.
    #[serde(default = "default_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Directory for daemon log files; stderr when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    pub algorithm: Algorithm,
    /// Prespawn: pool size to maintain. Reactive: per-tick upper bound.
    pub base_quantity: usize,
    pub vm_image: String,
    pub vm_flavor: String,
    /// Reactive only: labels this manager accepts from the job queue.
    #[serde(default)]
    pub supported_labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsSection {
    /// Where metric events are appended as JSON lines.
    #[serde(default = "default_events_path")]
    pub log_path: PathBuf,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self { log_path: default_events_path() }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_events_path() -> PathBuf {
    PathBuf::from("runner-events.jsonl")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub manager: ManagerSection,
    pub policy: PolicySection,
    #[serde(default)]
    pub events: EventsSection,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.manager.name;
        if name.is_empty() {
            return Err(ConfigError::Invalid("manager.name must not be empty".into()));
        }
        if !name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
            return Err(ConfigError::Invalid(format!(
                "manager.name {name:?} may only contain lowercase letters, digits, and dashes"
            )));
        }
        if name.starts_with('-') || name.ends_with('-') {
            return Err(ConfigError::Invalid(format!(
                "manager.name {name:?} must not start or end with a dash"
            )));
        }
        // A trailing "-r" would collide with the reactive name marker.
        if name.ends_with("-r") {
            return Err(ConfigError::Invalid(format!(
                "manager.name {name:?} must not end with \"-r\""
            )));
        }
        if self.manager.labels.is_empty() {
            return Err(ConfigError::Invalid("manager.labels must not be empty".into()));
        }
        if self.manager.reconcile_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "manager.reconcile_interval_secs must be at least 1".into(),
            ));
        }
        if self.policy.vm_image.is_empty() || self.policy.vm_flavor.is_empty() {
            return Err(ConfigError::Invalid(
                "policy.vm_image and policy.vm_flavor must not be empty".into(),
            ));
        }
        if self.policy.algorithm == Algorithm::Reactive && self.policy.supported_labels.is_empty()
        {
            return Err(ConfigError::Invalid(
                "policy.supported_labels must not be empty for the reactive algorithm".into(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.manager.reconcile_interval_secs)
    }

    /// The engine-side policy configuration.
    pub fn policy_config(&self) -> PolicyConfig {
        match self.policy.algorithm {
            Algorithm::Prespawn => PolicyConfig::Prespawn(PrespawnConfig {
                base_quantity: self.policy.base_quantity,
                vm_image: self.policy.vm_image.clone(),
                vm_flavor: self.policy.vm_flavor.clone(),
            }),
            Algorithm::Reactive => PolicyConfig::Reactive(ReactiveConfig {
                base_quantity: self.policy.base_quantity,
                vm_image: self.policy.vm_image.clone(),
                vm_flavor: self.policy.vm_flavor.clone(),
                supported_labels: self.policy.supported_labels.iter().cloned().collect(),
            }),
        }
    }

    /// The engine-side manager identity.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            manager_name: self.manager.name.clone(),
            labels: self.manager.labels.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
