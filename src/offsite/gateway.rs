//! Offsite packaging and transfer
//!
//! A package is a single uncompressed tar holding the newest base snapshot
//! directory (under `base/<id>/`) and every archived segment as stored
//! (under `wal/`). Members are already encoded, so the package adds no
//! second compression or encryption layer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tar::Builder;
use tracing::{info, warn};

use super::transport::OffsiteTransport;
use crate::backup::{discard, ArchiveReport, LogArchiver};
use crate::config::VaultPaths;
use crate::error::{VaultError, VaultResult};
use crate::models::{artifact_id, ArtifactClass, PARTIAL_SUFFIX};
use crate::storage::{tarball, ArtifactStore, ClassLock};

/// Extension of offsite packages
pub const PACKAGE_EXTENSION: &str = "tar";

/// Outcome of an offsite run
#[derive(Debug, Clone)]
pub struct OffsiteReport {
    pub package: PathBuf,
    pub base_snapshot: String,
    pub segments: usize,
    pub size_bytes: u64,
    /// Where the transport put the package
    pub remote: String,
    /// Force-cut pass run before packaging
    pub archive: ArchiveReport,
    pub duration_ms: u64,
}

impl OffsiteReport {
    pub fn summary(&self) -> String {
        format!(
            "Sent {} ({} + {} segment(s), {} bytes) to {}",
            self.package
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            self.base_snapshot,
            self.segments,
            self.size_bytes,
            self.remote
        )
    }
}

/// Packages the newest base snapshot with its segments and ships it
pub struct TransferGateway<'a> {
    paths: &'a VaultPaths,
    archiver: &'a LogArchiver<'a>,
    transport: &'a dyn OffsiteTransport,
}

impl<'a> TransferGateway<'a> {
    pub fn new(
        paths: &'a VaultPaths,
        archiver: &'a LogArchiver<'a>,
        transport: &'a dyn OffsiteTransport,
    ) -> Self {
        Self {
            paths,
            archiver,
            transport,
        }
    }

    /// Force a segment cut, package, then send
    pub fn run(&self) -> VaultResult<OffsiteReport> {
        let started = Instant::now();
        let _lock = ClassLock::acquire(self.paths, ArtifactClass::Offsite, "remote")?;

        let archive = self.archiver.force_cut()?;
        info!(archive = %archive.summary(), "segments cut before packaging");

        let (package, base_snapshot, segments) = self.package()?;
        let size_bytes = fs::metadata(&package)?.len();

        info!(
            package = %package.display(),
            destination = %self.transport.destination(),
            "transferring package"
        );
        let remote = self.transport.send(&package)?;

        Ok(OffsiteReport {
            package,
            base_snapshot,
            segments,
            size_bytes,
            remote,
            archive,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Build `offsite/offsite_<ts>.tar` from the newest base snapshot
    fn package(&self) -> VaultResult<(PathBuf, String, usize)> {
        let store = ArtifactStore::new(self.paths.clone());
        let base = store
            .latest_snapshot(ArtifactClass::Base)?
            .ok_or_else(|| {
                VaultError::base_snapshot_not_found("latest (run `walvault base` first)")
            })?;
        let segments = store.list_segments()?;

        let offsite_dir = self.paths.offsite_dir();
        fs::create_dir_all(&offsite_dir)?;

        let name = format!(
            "{}.{}",
            artifact_id(ArtifactClass::Offsite, self.unique_timestamp(Utc::now())),
            PACKAGE_EXTENSION
        );
        let partial = offsite_dir.join(format!("{}{}", name, PARTIAL_SUFFIX));
        let final_path = offsite_dir.join(&name);

        let segment_paths: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();
        if let Err(e) = write_package(&partial, &base.dir, base.id(), &segment_paths) {
            discard(&partial);
            return Err(e);
        }

        if let Err(e) = fs::rename(&partial, &final_path) {
            discard(&partial);
            return Err(VaultError::Io(format!(
                "Failed to finalize {}: {}",
                final_path.display(),
                e
            )));
        }

        info!(
            package = %final_path.display(),
            base = %base.id(),
            segments = segments.len(),
            "offsite package written"
        );
        Ok((final_path, base.id().to_string(), segments.len()))
    }

    fn unique_timestamp(&self, mut at: DateTime<Utc>) -> DateTime<Utc> {
        let dir = self.paths.offsite_dir();
        let taken = |at: DateTime<Utc>| {
            let name = format!("{}.{}", artifact_id(ArtifactClass::Offsite, at), PACKAGE_EXTENSION);
            dir.join(&name).exists() || dir.join(format!("{}{}", name, PARTIAL_SUFFIX)).exists()
        };
        while taken(at) {
            at += Duration::milliseconds(1);
        }
        at
    }
}

fn write_package(dest: &Path, base_dir: &Path, base_id: &str, segments: &[PathBuf]) -> VaultResult<()> {
    let file = File::create(dest)
        .map_err(|e| VaultError::Io(format!("Failed to create {}: {}", dest.display(), e)))?;
    let mut builder = Builder::new(BufWriter::new(file));

    let prefix = Path::new(ArtifactClass::Base.dir_name()).join(base_id);
    tarball::append_tree(&mut builder, base_dir, &prefix)?;

    let wal_prefix = Path::new(ArtifactClass::Wal.dir_name());
    for segment in segments {
        let Some(name) = segment.file_name() else {
            warn!(path = %segment.display(), "skipping segment without a file name");
            continue;
        };
        builder
            .append_path_with_name(segment, wal_prefix.join(name))
            .map_err(|e| {
                VaultError::Io(format!("tar append failed for {}: {}", segment.display(), e))
            })?;
    }

    let mut writer = builder
        .into_inner()
        .map_err(|e| VaultError::Io(format!("tar finish failed for {}: {}", dest.display(), e)))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ArtifactCodec;
    use crate::engine::SourceEngine;
    use crate::models::{SnapshotFormat, SnapshotMetadata, Trigger, METADATA_FILE};
    use crate::storage::write_json_atomic;
    use std::cell::RefCell;
    use tar::Archive;
    use tempfile::TempDir;

    struct IdleEngine;

    impl SourceEngine for IdleEngine {
        fn describe(&self) -> String {
            "idle".into()
        }
        fn ping(&self) -> VaultResult<()> {
            Ok(())
        }
        fn check_privileges(&self) -> VaultResult<()> {
            Ok(())
        }
        fn server_version(&self) -> VaultResult<String> {
            Ok("16".into())
        }
        fn base_backup(&self, _dest: &Path) -> VaultResult<()> {
            Ok(())
        }
        fn current_segment(&self) -> VaultResult<Option<String>> {
            Ok(None)
        }
        fn switch_segment(&self) -> VaultResult<()> {
            Ok(())
        }
    }

    /// Copies packages into a local directory
    struct DirTransport {
        dir: PathBuf,
        sent: RefCell<Vec<PathBuf>>,
    }

    impl OffsiteTransport for DirTransport {
        fn destination(&self) -> String {
            self.dir.display().to_string()
        }

        fn send(&self, package: &Path) -> VaultResult<String> {
            let dest = self.dir.join(package.file_name().unwrap());
            fs::copy(package, &dest)?;
            self.sent.borrow_mut().push(dest.clone());
            Ok(dest.display().to_string())
        }
    }

    struct FailingTransport;

    impl OffsiteTransport for FailingTransport {
        fn destination(&self) -> String {
            "nowhere".into()
        }

        fn send(&self, _package: &Path) -> VaultResult<String> {
            Err(VaultError::Transfer("connection refused".into()))
        }
    }

    fn seed_base(paths: &VaultPaths) -> String {
        let id = "base_20261016T020000.000Z";
        let dir = paths.class_dir(ArtifactClass::Base).join(id);
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(dir.join("data").join("PG_VERSION"), "16\n").unwrap();
        let metadata = SnapshotMetadata {
            schema_version: 1,
            id: id.into(),
            class: ArtifactClass::Base,
            created_at: "2026-10-16T02:00:00Z".parse().unwrap(),
            format: SnapshotFormat::Streamed,
            chain: crate::codec::EncodingChain::Plain,
            payload: "data".into(),
            size_bytes: 3,
            raw_size_bytes: 3,
            checksum: None,
            engine_version: "16".into(),
            trigger: Trigger::Scheduled,
            label: None,
            source: "test".into(),
        };
        write_json_atomic(dir.join(METADATA_FILE), &metadata).unwrap();
        id.to_string()
    }

    fn setup() -> (TempDir, VaultPaths, PathBuf) {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp.path().join("store"));
        paths.ensure_directories().unwrap();
        let source = temp.path().join("pg_wal");
        fs::create_dir_all(&source).unwrap();
        (temp, paths, source)
    }

    #[test]
    fn test_package_contains_base_and_segments() {
        let (temp, paths, source) = setup();
        let base_id = seed_base(&paths);
        fs::write(paths.wal_dir().join("000000010000000000000001.gz"), b"x").unwrap();
        fs::write(paths.wal_dir().join("000000010000000000000002.gz"), b"y").unwrap();

        let remote_dir = temp.path().join("remote");
        fs::create_dir_all(&remote_dir).unwrap();
        let transport = DirTransport {
            dir: remote_dir.clone(),
            sent: RefCell::new(Vec::new()),
        };
        let codec = ArtifactCodec::plain();
        let engine = IdleEngine;
        let archiver = LogArchiver::new(&paths, &source, &codec, &engine);

        let report = TransferGateway::new(&paths, &archiver, &transport)
            .run()
            .unwrap();
        assert_eq!(report.base_snapshot, base_id);
        assert_eq!(report.segments, 2);
        assert!(report.package.is_file());
        assert_eq!(transport.sent.borrow().len(), 1);

        let mut names: Vec<String> = Archive::new(File::open(&report.package).unwrap())
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        assert!(names.contains(&format!("base/{}/data/PG_VERSION", base_id)));
        assert!(names.contains(&format!("base/{}/{}", base_id, METADATA_FILE)));
        assert!(names.contains(&"wal/000000010000000000000001.gz".to_string()));
        assert!(names.contains(&"wal/000000010000000000000002.gz".to_string()));
    }

    #[test]
    fn test_no_base_snapshot_is_not_found() {
        let (_temp, paths, source) = setup();
        let codec = ArtifactCodec::plain();
        let engine = IdleEngine;
        let archiver = LogArchiver::new(&paths, &source, &codec, &engine);

        let err = TransferGateway::new(&paths, &archiver, &FailingTransport)
            .run()
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("Base snapshot not found"));
        assert!(fs::read_dir(paths.offsite_dir()).unwrap().next().is_none());
    }

    #[test]
    fn test_transfer_failure_is_reported() {
        let (_temp, paths, source) = setup();
        seed_base(&paths);
        let codec = ArtifactCodec::plain();
        let engine = IdleEngine;
        let archiver = LogArchiver::new(&paths, &source, &codec, &engine);

        let err = TransferGateway::new(&paths, &archiver, &FailingTransport)
            .run()
            .unwrap_err();
        assert!(matches!(err, VaultError::Transfer(_)));
        // Lock released for the next run
        assert!(!paths.lock_file(ArtifactClass::Offsite).exists());
    }
}
