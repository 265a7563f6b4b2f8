//! Artifact store inventory
//!
//! Read-side view of the store layout. Nothing here mutates artifacts; the
//! capture, archive and sweep components write, this module enumerates.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::file_io::{is_temp_name, read_json_required};
use crate::codec::EncodingChain;
use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    is_archivable_name, is_partial, parse_artifact_id, ArchivedSegment, ArtifactClass,
    SnapshotArtifact, SnapshotMetadata, METADATA_FILE,
};

/// An offsite package in `offsite/`
#[derive(Debug, Clone)]
pub struct OffsitePackage {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl OffsitePackage {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Modification time of a file as UTC
pub fn modified_at(path: &Path) -> VaultResult<DateTime<Utc>> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Total size of a file or directory tree
pub fn disk_usage(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Read a completed snapshot's sidecar
pub fn read_snapshot(dir: &Path) -> VaultResult<SnapshotArtifact> {
    if is_partial(dir) {
        return Err(VaultError::Validation(format!(
            "{} is an incomplete capture",
            dir.display()
        )));
    }

    let sidecar = dir.join(METADATA_FILE);
    if !sidecar.exists() {
        return Err(VaultError::Validation(format!(
            "{} has no {}; it is not a completed snapshot",
            dir.display(),
            METADATA_FILE
        )));
    }

    let metadata: SnapshotMetadata = read_json_required(&sidecar)?;
    Ok(SnapshotArtifact {
        metadata,
        dir: dir.to_path_buf(),
    })
}

fn read_dir_entries(dir: &Path) -> VaultResult<Vec<fs::DirEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", dir.display(), e)))?
    {
        entries.push(entry.map_err(|e| {
            VaultError::Io(format!("Failed to read entry in {}: {}", dir.display(), e))
        })?);
    }
    Ok(entries)
}

/// Enumerates artifacts under a store home
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: VaultPaths,
}

impl ArtifactStore {
    pub fn new(paths: VaultPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Load a completed snapshot from its directory
    pub fn load_snapshot(&self, dir: &Path) -> VaultResult<SnapshotArtifact> {
        read_snapshot(dir)
    }

    /// Completed snapshots of a class, newest first
    pub fn list_snapshots(&self, class: ArtifactClass) -> VaultResult<Vec<SnapshotArtifact>> {
        if !class.is_snapshot() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in read_dir_entries(&self.paths.class_dir(class))? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_dir() || is_partial(&path) {
                continue;
            }
            if !matches!(parse_artifact_id(&name), Some((c, _)) if c == class) {
                continue;
            }

            match self.load_snapshot(&path) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable snapshot"),
            }
        }

        snapshots.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(snapshots)
    }

    /// Newest completed snapshot of a class
    pub fn latest_snapshot(&self, class: ArtifactClass) -> VaultResult<Option<SnapshotArtifact>> {
        Ok(self.list_snapshots(class)?.into_iter().next())
    }

    /// Archived segments, in sequence order
    pub fn list_segments(&self) -> VaultResult<Vec<ArchivedSegment>> {
        let mut segments = Vec::new();
        for entry in read_dir_entries(&self.paths.wal_dir())? {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !path.is_file() || is_temp_name(&file_name) {
                continue;
            }

            let (stem, chain) = EncodingChain::classify(&file_name);
            if !is_archivable_name(stem) {
                continue;
            }

            let metadata = entry.metadata()?;
            segments.push(ArchivedSegment {
                name: stem.to_string(),
                chain,
                size_bytes: metadata.len(),
                archived_at: DateTime::<Utc>::from(metadata.modified()?),
                path,
            });
        }

        segments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(segments)
    }

    /// Whether any encoded variant of segment `name` is already stored
    pub fn segment_variants_exist(&self, name: &str) -> bool {
        let dir = self.paths.wal_dir();
        EncodingChain::variants(name)
            .iter()
            .any(|variant| dir.join(variant).exists())
    }

    /// Completed offsite packages, newest first
    pub fn list_offsite_packages(&self) -> VaultResult<Vec<OffsitePackage>> {
        let mut packages = Vec::new();
        for entry in read_dir_entries(&self.paths.offsite_dir())? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_file() || is_partial(&path) {
                continue;
            }
            if !matches!(parse_artifact_id(&name), Some((ArtifactClass::Offsite, _))) {
                continue;
            }

            let metadata = entry.metadata()?;
            packages.push(OffsitePackage {
                name,
                size_bytes: metadata.len(),
                created_at: DateTime::<Utc>::from(metadata.modified()?),
                path,
            });
        }

        packages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(packages)
    }

    /// Leftovers of interrupted runs in a class's area
    ///
    /// `.partial` snapshot directories and packages, and `.tmp` files from
    /// interrupted atomic writes.
    pub fn list_partials(&self, class: ArtifactClass) -> VaultResult<Vec<PathBuf>> {
        let mut partials: Vec<PathBuf> = read_dir_entries(&self.paths.class_dir(class))?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                is_partial(path) || is_temp_name(&name)
            })
            .collect();
        partials.sort();
        Ok(partials)
    }

    /// Resolve a snapshot reference given on the command line
    ///
    /// Accepts `latest` (newest full or base snapshot), a snapshot id, or a
    /// path to a snapshot directory.
    pub fn resolve_snapshot(&self, reference: &str) -> VaultResult<SnapshotArtifact> {
        if reference.eq_ignore_ascii_case("latest") {
            let mut candidates = Vec::new();
            for class in [ArtifactClass::Full, ArtifactClass::Base] {
                if let Some(snapshot) = self.latest_snapshot(class)? {
                    candidates.push(snapshot);
                }
            }
            return candidates
                .into_iter()
                .max_by_key(|s| s.created_at())
                .ok_or_else(|| VaultError::snapshot_not_found("latest (store has no snapshots)"));
        }

        let as_path = Path::new(reference);
        if as_path.join(METADATA_FILE).exists() {
            return self.load_snapshot(as_path);
        }

        match parse_artifact_id(reference) {
            Some((class, _)) if class.is_snapshot() => {
                let dir = self.paths.class_dir(class).join(reference);
                if dir.is_dir() {
                    self.load_snapshot(&dir)
                } else {
                    Err(VaultError::snapshot_not_found(reference))
                }
            }
            _ => Err(VaultError::snapshot_not_found(reference)),
        }
    }

    /// Resolve any artifact reference (snapshot id or path, segment name,
    /// package name, or file path) to a path on disk
    pub fn resolve_artifact(&self, reference: &str) -> VaultResult<PathBuf> {
        let as_path = Path::new(reference);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        if let Ok(snapshot) = self.resolve_snapshot(reference) {
            return Ok(snapshot.dir);
        }

        for variant in EncodingChain::variants(reference) {
            let candidate = self.paths.wal_dir().join(&variant);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        let package = self.paths.offsite_dir().join(reference);
        if package.is_file() {
            return Ok(package);
        }

        Err(VaultError::artifact_not_found(reference))
    }
}
