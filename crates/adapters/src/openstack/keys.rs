// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Private key files for runner VMs.
//!
//! One key file per instance, named `<instance>.key` under the manager's
//! key directory, mode 0400. The directory is owned by the manager's system
//! user; nothing else may read the keys.

use crate::cloud::KeyfileError;
use rf_core::InstanceId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const KEY_SUFFIX: &str = ".key";

#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{KEY_SUFFIX}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.key_path(name).exists()
    }

    /// Write a private key, replacing any stale file, and restrict it to
    /// owner-read.
    pub fn write(&self, name: &str, private_key: &str) -> Result<PathBuf, KeyfileError> {
        let path = self.key_path(name);
        if path.exists() {
            tracing::warn!(server = name, "existing private key file found, removing it");
            let _ = std::fs::remove_file(&path);
        }
        std::fs::write(&path, private_key)
            .map_err(|source| KeyfileError::Io { path: path.clone(), source })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o400))
                .map_err(|source| KeyfileError::Io { path: path.clone(), source })?;
        }
        Ok(path)
    }

    /// Best-effort removal of a key file.
    pub fn remove(&self, name: &str) {
        let path = self.key_path(name);
        if let Err(error) = std::fs::remove_file(&path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "unable to delete key file");
            }
        }
    }

    /// Delete every prefix-scoped key file whose instance is not in `keep`.
    /// Returns how many files were removed.
    pub fn cleanup(&self, prefix: &str, keep: &HashSet<String>) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut deleted = 0;
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            let Some(instance) = file_name.strip_suffix(KEY_SUFFIX) else { continue };
            if !InstanceId::name_has_prefix(prefix, instance) || keep.contains(instance) {
                continue;
            }
            if std::fs::remove_file(entry.path()).is_ok() {
                deleted += 1;
            }
        }
        deleted
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
