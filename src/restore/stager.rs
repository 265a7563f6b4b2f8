//! Restore staging
//!
//! Rebuilds a data directory from a snapshot plus every archived segment and
//! leaves the engine a recovery descriptor. Staging never touches the
//! running engine; starting it on the staged directory is the operator's
//! step.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::descriptor::{RecoveryAction, RecoveryDescriptor};
use crate::codec::ArtifactCodec;
use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::models::{SnapshotArtifact, SnapshotFormat};
use crate::storage::{tarball, ArtifactStore};

/// Subdirectory of the staging root holding the rebuilt data directory
pub const STAGED_DATA_DIR: &str = "data";

/// Subdirectory of the staging root holding decoded segments
pub const REPLAY_DIR: &str = "wal_replay";

/// A prepared restore, ready for the engine
#[derive(Debug, Clone)]
pub struct StagedRestore {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub replay_dir: PathBuf,
    pub descriptor: RecoveryDescriptor,
}

impl StagedRestore {
    pub fn summary(&self) -> String {
        let target = match self.descriptor.target_time {
            Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "latest".to_string(),
        };
        format!(
            "Staged {} with {} segment(s) at {} (recovery target: {})",
            self.descriptor.base_snapshot,
            self.descriptor.segment_count,
            self.root.display(),
            target
        )
    }
}

/// Result of a direct restore into a data directory
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub snapshot: String,
    pub target: PathBuf,
    /// Where the previous contents of the target were moved
    pub moved_aside: Option<PathBuf>,
    /// Full snapshot of the engine taken just before the restore
    pub pre_restore_snapshot: Option<String>,
}

impl RestoreResult {
    pub fn summary(&self) -> String {
        let mut text = format!("Restored {} into {}", self.snapshot, self.target.display());
        if let Some(aside) = &self.moved_aside {
            text.push_str(&format!(" (previous contents kept at {})", aside.display()));
        }
        if let Some(id) = &self.pre_restore_snapshot {
            text.push_str(&format!("; pre-restore snapshot {}", id));
        }
        text
    }
}

/// Decodes snapshots and segments for restore
pub struct RestoreStager<'a> {
    paths: &'a VaultPaths,
    codec: &'a ArtifactCodec,
}

impl<'a> RestoreStager<'a> {
    pub fn new(paths: &'a VaultPaths, codec: &'a ArtifactCodec) -> Self {
        Self { paths, codec }
    }

    /// Stage `snapshot` plus all archived segments under `root`
    ///
    /// `root` must be absent or empty. On failure nothing is left behind.
    pub fn stage(
        &self,
        snapshot: &SnapshotArtifact,
        target_time: Option<DateTime<Utc>>,
        root: &Path,
    ) -> VaultResult<StagedRestore> {
        if root.exists() && fs::read_dir(root)?.next().is_some() {
            return Err(VaultError::Validation(format!(
                "staging directory {} is not empty",
                root.display()
            )));
        }

        if let Some(target) = target_time {
            if target < snapshot.created_at() {
                return Err(VaultError::Validation(format!(
                    "recovery target {} is before snapshot {} was taken",
                    target.format("%Y-%m-%d %H:%M:%S UTC"),
                    snapshot.id()
                )));
            }
        }

        info!(snapshot = %snapshot.id(), root = %root.display(), "staging restore");
        match self.stage_into(snapshot, target_time, root) {
            Ok(staged) => {
                info!("{}", staged.summary());
                Ok(staged)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(root) {
                    warn!(root = %root.display(), error = %cleanup, "failed to remove staging directory");
                }
                Err(e)
            }
        }
    }

    fn stage_into(
        &self,
        snapshot: &SnapshotArtifact,
        target_time: Option<DateTime<Utc>>,
        root: &Path,
    ) -> VaultResult<StagedRestore> {
        let data_dir = root.join(STAGED_DATA_DIR);
        let replay_dir = root.join(REPLAY_DIR);
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&replay_dir)?;

        self.materialize(snapshot, &data_dir)?;

        let store = ArtifactStore::new(self.paths.clone());
        let segments = store.list_segments()?;
        for segment in &segments {
            self.codec
                .decode_file_to(&segment.path, &replay_dir.join(&segment.name))?;
        }

        let root = fs::canonicalize(root)?;
        let descriptor = RecoveryDescriptor {
            staging_path: root.clone(),
            data_dir: root.join(STAGED_DATA_DIR),
            target_time,
            replay_source: root.join(REPLAY_DIR),
            action: RecoveryAction::Promote,
            base_snapshot: snapshot.id().to_string(),
            segment_count: segments.len(),
            created_at: Utc::now(),
        };
        descriptor.write()?;

        Ok(StagedRestore {
            data_dir: descriptor.data_dir.clone(),
            replay_dir: descriptor.replay_source.clone(),
            root,
            descriptor,
        })
    }

    /// Decode a snapshot straight into a data directory, without recovery
    ///
    /// A non-empty `target` is refused unless `force` is set, in which case
    /// its contents are moved aside to `<target>.pre-restore-<timestamp>`.
    pub fn restore_into(
        &self,
        snapshot: &SnapshotArtifact,
        target: &Path,
        force: bool,
    ) -> VaultResult<RestoreResult> {
        let occupied = target.exists() && fs::read_dir(target)?.next().is_some();
        if occupied && !force {
            return Err(VaultError::Validation(format!(
                "{} is not empty; pass --force to move its contents aside",
                target.display()
            )));
        }

        let moved_aside = if occupied {
            let mut aside = target.as_os_str().to_os_string();
            aside.push(format!(".pre-restore-{}", Utc::now().format("%Y%m%dT%H%M%S")));
            let aside = PathBuf::from(aside);
            fs::rename(target, &aside).map_err(|e| {
                VaultError::Io(format!(
                    "Failed to move {} aside to {}: {}",
                    target.display(),
                    aside.display(),
                    e
                ))
            })?;
            warn!(from = %target.display(), to = %aside.display(), "moved existing data directory aside");
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::create_dir_all(target)
            .map_err(VaultError::from)
            .and_then(|()| self.materialize(snapshot, target))
        {
            return Err(roll_back(target, moved_aside.as_deref(), e));
        }

        Ok(RestoreResult {
            snapshot: snapshot.id().to_string(),
            target: target.to_path_buf(),
            moved_aside,
            pre_restore_snapshot: None,
        })
    }

    /// Decode a snapshot's payload into `dest`
    fn materialize(&self, snapshot: &SnapshotArtifact, dest: &Path) -> VaultResult<()> {
        let payload = snapshot.payload_path();
        if !payload.exists() {
            return Err(VaultError::Integrity(format!(
                "snapshot {} has no payload at {}",
                snapshot.id(),
                payload.display()
            )));
        }

        match snapshot.metadata.format {
            SnapshotFormat::Packaged => {
                if let Some(expected) = &snapshot.metadata.checksum {
                    let actual = tarball::sha256_file(&payload)?;
                    if &actual != expected {
                        return Err(VaultError::Integrity(format!(
                            "snapshot {} checksum mismatch (expected {}, found {})",
                            snapshot.id(),
                            expected,
                            actual
                        )));
                    }
                }
                self.codec
                    .read_decoded(&payload, |stream| tarball::unpack(stream, dest))?;
            }
            SnapshotFormat::Streamed => copy_tree(&payload, dest)?,
        }

        restrict_permissions(dest)
    }
}

/// Undo a failed direct restore, putting the previous contents back
///
/// Whatever cannot be undone is added to `err` so the operator learns where
/// the previous data directory is.
fn roll_back(target: &Path, aside: Option<&Path>, err: VaultError) -> VaultError {
    if target.exists() {
        if let Err(e) = fs::remove_dir_all(target) {
            warn!(target = %target.display(), error = %e, "failed to remove partially restored directory");
        }
    }

    let Some(aside) = aside else {
        return err;
    };
    match fs::rename(aside, target) {
        Ok(()) => {
            info!(target = %target.display(), "previous data directory put back");
            err
        }
        Err(e) => {
            warn!(
                from = %aside.display(),
                to = %target.display(),
                error = %e,
                "failed to put previous data directory back"
            );
            err.with_note(format!(
                "previous data directory left at {}",
                aside.display()
            ))
        }
    }
}

/// Copy a directory tree, recreating symlinks as links
fn copy_tree(src: &Path, dest: &Path) -> VaultResult<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| VaultError::Io(format!("Failed to walk {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| VaultError::Io(e.to_string()))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                VaultError::Io(format!("Failed to copy {}: {}", entry.path().display(), e))
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> VaultResult<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> VaultResult<()> {
    warn!(link = %link.display(), "symlinks are not restored on this platform");
    Ok(())
}

/// The engine refuses to start on a group- or world-readable data directory
#[cfg(unix)]
fn restrict_permissions(dir: &Path) -> VaultResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_dir: &Path) -> VaultResult<()> {
    Ok(())
}
