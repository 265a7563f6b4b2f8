//! Path management for walvault
//!
//! Resolves the store home directory and the layout beneath it.
//!
//! ## Path Resolution Order
//!
//! 1. An explicit `--home` flag or `WALVAULT_HOME` environment variable
//! 2. The platform data directory from `directories` (e.g. `~/.local/share/walvault`)
//!
//! ## Layout
//!
//! ```text
//! <home>/
//!   config.json
//!   full/       full snapshots
//!   base/       base snapshots for incremental recovery
//!   wal/        archived log segments
//!   offsite/    offsite packages
//!   staging/    default restore staging roots
//!   logs/       operation log
//!   locks/      per-class lock files
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::VaultError;
use crate::models::ArtifactClass;

/// Manages all paths used by walvault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for the whole store
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Resolve the store home, honouring an explicit override first
    ///
    /// # Errors
    ///
    /// Returns an error if no override is given and the platform data
    /// directory cannot be determined.
    pub fn resolve(home: Option<PathBuf>) -> Result<Self, VaultError> {
        let base_dir = match home {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "walvault")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    VaultError::Config(
                        "Could not determine a home directory; pass --home or set WALVAULT_HOME"
                            .into(),
                    )
                })?,
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the storage area for an artifact class
    pub fn class_dir(&self, class: ArtifactClass) -> PathBuf {
        self.base_dir.join(class.dir_name())
    }

    /// Get the archived log segment directory
    pub fn wal_dir(&self) -> PathBuf {
        self.class_dir(ArtifactClass::Wal)
    }

    /// Get the offsite package directory
    pub fn offsite_dir(&self) -> PathBuf {
        self.class_dir(ArtifactClass::Offsite)
    }

    /// Get the default parent for restore staging roots
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    /// Get the operation log directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the path to the operation log
    pub fn operation_log(&self) -> PathBuf {
        self.logs_dir().join("operations.jsonl")
    }

    /// Get the lock directory
    pub fn locks_dir(&self) -> PathBuf {
        self.base_dir.join("locks")
    }

    /// Get the lock file for a class
    pub fn lock_file(&self, class: ArtifactClass) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", class.dir_name()))
    }

    /// Ensure every area of the store exists
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        let mut dirs = vec![
            self.base_dir.clone(),
            self.staging_dir(),
            self.logs_dir(),
            self.locks_dir(),
        ];
        dirs.extend(ArtifactClass::ALL.iter().map(|c| self.class_dir(*c)));

        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| {
                VaultError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }

    /// Check if the store has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.wal_dir(), temp_dir.path().join("wal"));
        assert_eq!(
            paths.class_dir(ArtifactClass::Full),
            temp_dir.path().join("full")
        );
        assert_eq!(
            paths.lock_file(ArtifactClass::Base),
            temp_dir.path().join("locks").join("base.lock")
        );
    }

    #[test]
    fn test_explicit_home_wins() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::resolve(Some(temp_dir.path().to_path_buf())).unwrap();
        assert_eq!(paths.base_dir(), temp_dir.path());
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().join("store"));

        paths.ensure_directories().unwrap();

        for class in ArtifactClass::ALL {
            assert!(paths.class_dir(class).is_dir());
        }
        assert!(paths.logs_dir().is_dir());
        assert!(paths.locks_dir().is_dir());
        assert!(!paths.is_initialized());
    }
}
