//! Per-class mutual exclusion
//!
//! A lock is a file under `locks/` created with `create_new`, so two runs
//! racing for the same class cannot both succeed. The file records who holds
//! it and is removed when the guard drops. A process killed while holding a
//! lock leaves the file behind; `walvault unlock <class>` clears it.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::models::ArtifactClass;

/// Contents of a lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub operation: String,
}

impl LockHolder {
    fn describe(&self) -> String {
        format!(
            "pid {} running {} since {}",
            self.pid,
            self.operation,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Guard for a held class lock
#[derive(Debug)]
pub struct ClassLock {
    class: ArtifactClass,
    path: PathBuf,
}

impl ClassLock {
    /// Take the lock for `class`, failing with `Locked` if it is held
    pub fn acquire(paths: &VaultPaths, class: ArtifactClass, operation: &str) -> VaultResult<Self> {
        let path = paths.lock_file(class);
        fs::create_dir_all(paths.locks_dir())?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = read_holder(&path)
                    .map(|h| h.describe())
                    .unwrap_or_else(|| format!("lock file {}", path.display()));
                return Err(VaultError::Locked {
                    class: class.to_string(),
                    holder,
                });
            }
            Err(e) => {
                return Err(VaultError::Io(format!(
                    "Failed to create lock {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            operation: operation.to_string(),
        };
        let lock = Self { class, path };

        // Dropping `lock` on error removes the file we just created
        let json = serde_json::to_string(&holder)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        debug!(class = %class, operation, "acquired class lock");
        Ok(lock)
    }

    pub fn class(&self) -> ArtifactClass {
        self.class
    }
}

impl Drop for ClassLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release class lock");
        } else {
            debug!(class = %self.class, "released class lock");
        }
    }
}

fn read_holder(path: &Path) -> Option<LockHolder> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Current holder of `class`'s lock, if any
pub fn lock_holder(paths: &VaultPaths, class: ArtifactClass) -> Option<LockHolder> {
    read_holder(&paths.lock_file(class))
}

/// Classes whose lock file exists, with holder info where readable
pub fn held_locks(paths: &VaultPaths) -> Vec<(ArtifactClass, Option<LockHolder>)> {
    ArtifactClass::ALL
        .into_iter()
        .filter(|class| paths.lock_file(*class).exists())
        .map(|class| (class, lock_holder(paths, class)))
        .collect()
}

/// Remove a lock left behind by a killed run
///
/// Returns the previous holder, or `None` if the class was not locked.
pub fn force_unlock(paths: &VaultPaths, class: ArtifactClass) -> VaultResult<Option<LockHolder>> {
    let path = paths.lock_file(class);
    if !path.exists() {
        return Ok(None);
    }

    let holder = read_holder(&path);
    fs::remove_file(&path)
        .map_err(|e| VaultError::Io(format!("Failed to remove lock {}: {}", path.display(), e)))?;
    warn!(class = %class, "removed class lock by request");
    Ok(holder)
}
