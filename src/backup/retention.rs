//! Age-based retention
//!
//! An artifact is deleted once its age strictly exceeds its class's window.
//! There is no minimum-retained floor: a store whose newest snapshot is
//! older than the window ends up empty for that class.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::settings::RetentionSettings;
use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::models::ArtifactClass;
use crate::storage::{ArtifactStore, ClassLock};

/// Outcome of sweeping one class
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub class: ArtifactClass,
    pub window_days: u32,
    /// Artifacts deleted, or that would be deleted on a dry run
    pub deleted: Vec<PathBuf>,
    /// Leftovers of interrupted runs removed
    pub partials_removed: Vec<PathBuf>,
    pub kept: usize,
    pub dry_run: bool,
}

impl SweepReport {
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would delete" } else { "deleted" };
        format!(
            "{}: {} {} older than {} day(s), kept {}",
            self.class,
            verb,
            self.deleted.len(),
            self.window_days,
            self.kept
        )
    }
}

struct Aged {
    path: PathBuf,
    age: Duration,
}

/// Deletes artifacts older than their class's retention window
pub struct RetentionSweeper<'a> {
    paths: &'a VaultPaths,
    retention: &'a RetentionSettings,
}

impl<'a> RetentionSweeper<'a> {
    pub fn new(paths: &'a VaultPaths, retention: &'a RetentionSettings) -> Self {
        Self { paths, retention }
    }

    /// Sweep one class as of `now`
    pub fn sweep(&self, class: ArtifactClass, now: DateTime<Utc>, dry_run: bool) -> VaultResult<SweepReport> {
        let _lock = ClassLock::acquire(self.paths, class, "sweep")?;

        let window_days = self.retention.window_days(class);
        let window = Duration::days(i64::from(window_days));
        let store = ArtifactStore::new(self.paths.clone());

        let mut report = SweepReport {
            class,
            window_days,
            deleted: Vec::new(),
            partials_removed: Vec::new(),
            kept: 0,
            dry_run,
        };

        for artifact in self.aged_artifacts(&store, class, now)? {
            if artifact.age <= window {
                report.kept += 1;
                continue;
            }

            if !dry_run {
                remove(&artifact.path)?;
                info!(
                    class = %class,
                    path = %artifact.path.display(),
                    age_days = artifact.age.num_days(),
                    "expired artifact deleted"
                );
            }
            report.deleted.push(artifact.path);
        }

        for partial in store.list_partials(class)? {
            if !dry_run {
                warn!(path = %partial.display(), "removing incomplete artifact");
                remove(&partial)?;
            }
            report.partials_removed.push(partial);
        }

        info!(class = %class, deleted = report.deleted.len(), kept = report.kept, dry_run, "sweep complete");
        Ok(report)
    }

    /// Sweep every class
    pub fn sweep_all(&self, now: DateTime<Utc>, dry_run: bool) -> VaultResult<Vec<SweepReport>> {
        ArtifactClass::ALL
            .into_iter()
            .map(|class| self.sweep(class, now, dry_run))
            .collect()
    }

    fn aged_artifacts(
        &self,
        store: &ArtifactStore,
        class: ArtifactClass,
        now: DateTime<Utc>,
    ) -> VaultResult<Vec<Aged>> {
        let aged = match class {
            ArtifactClass::Full | ArtifactClass::Base => store
                .list_snapshots(class)?
                .into_iter()
                .map(|s| Aged {
                    age: s.age(now),
                    path: s.dir,
                })
                .collect(),
            ArtifactClass::Wal => store
                .list_segments()?
                .into_iter()
                .map(|s| Aged {
                    age: s.age(now),
                    path: s.path,
                })
                .collect(),
            ArtifactClass::Offsite => store
                .list_offsite_packages()?
                .into_iter()
                .map(|p| Aged {
                    age: p.age(now),
                    path: p.path,
                })
                .collect(),
        };
        Ok(aged)
    }
}

fn remove(path: &Path) -> VaultResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| VaultError::Io(format!("Failed to delete {}: {}", path.display(), e)))
}
