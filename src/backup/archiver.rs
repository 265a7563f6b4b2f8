//! Log segment archiving
//!
//! Copies closed segments from the engine's log directory into `wal/`
//! through the artifact codec. Archiving is idempotent: a segment that is
//! already stored under any encoding is never written again, so running the
//! archiver twice over an unchanged log directory archives nothing new.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec::ArtifactCodec;
use crate::config::VaultPaths;
use crate::engine::SourceEngine;
use crate::error::{VaultError, VaultResult};
use crate::models::{is_archivable_name, is_wal_segment_name, ArtifactClass};
use crate::storage::{write_bytes_atomic, ArtifactStore, ClassLock};

/// Outcome of one archiving pass
#[derive(Debug, Clone, Default)]
pub struct ArchiveReport {
    /// Segments newly written to the store
    pub archived: Vec<String>,
    /// Segments already present under some encoding
    pub skipped_existing: usize,
    /// Segments still being written (current, recycled, empty or growing)
    pub skipped_open: usize,
}

impl ArchiveReport {
    pub fn summary(&self) -> String {
        format!(
            "{} archived, {} already stored, {} still open",
            self.archived.len(),
            self.skipped_existing,
            self.skipped_open
        )
    }
}

enum Candidate {
    Archived,
    Existing,
    Open,
}

/// Copies closed segments into the store
pub struct LogArchiver<'a> {
    paths: &'a VaultPaths,
    source_dir: PathBuf,
    codec: &'a ArtifactCodec,
    engine: &'a dyn SourceEngine,
}

impl<'a> LogArchiver<'a> {
    pub fn new(
        paths: &'a VaultPaths,
        source_dir: &Path,
        codec: &'a ArtifactCodec,
        engine: &'a dyn SourceEngine,
    ) -> Self {
        Self {
            paths,
            source_dir: source_dir.to_path_buf(),
            codec,
            engine,
        }
    }

    /// Archive every closed segment not yet in the store
    pub fn archive(&self) -> VaultResult<ArchiveReport> {
        let _lock = ClassLock::acquire(self.paths, ArtifactClass::Wal, "wal")?;
        self.archive_locked()
    }

    /// Ask the engine to close its current segment, then archive
    ///
    /// With no writes since the previous switch the engine has nothing to
    /// close and the pass archives nothing.
    pub fn force_cut(&self) -> VaultResult<ArchiveReport> {
        let _lock = ClassLock::acquire(self.paths, ArtifactClass::Wal, "switch")?;
        self.engine.switch_segment()?;
        self.archive_locked()
    }

    fn archive_locked(&self) -> VaultResult<ArchiveReport> {
        if !self.source_dir.is_dir() {
            return Err(VaultError::Config(format!(
                "source log directory {} does not exist (source.wal_dir)",
                self.source_dir.display()
            )));
        }

        let store = ArtifactStore::new(self.paths.clone());
        fs::create_dir_all(self.paths.wal_dir())?;

        let reported = self.engine.current_segment()?;
        let mut names: Vec<String> = fs::read_dir(&self.source_dir)
            .map_err(|e| {
                VaultError::Io(format!("Failed to read {}: {}", self.source_dir.display(), e))
            })?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| is_archivable_name(name))
            .collect();
        names.sort();

        // Segments are preallocated at full size, so a size check cannot tell
        // a finished segment from one still being written. Without a position
        // from the engine, the newest segment in the directory stays open.
        let current = reported.or_else(|| {
            let newest = names.iter().rev().find(|name| is_wal_segment_name(name)).cloned();
            if let Some(newest) = &newest {
                debug!(segment = %newest, "engine reported no current segment; holding back the newest");
            }
            newest
        });

        let mut report = ArchiveReport::default();
        for name in names {
            let is_open = is_wal_segment_name(&name)
                && current.as_deref().is_some_and(|current| name.as_str() >= current);
            if is_open {
                report.skipped_open += 1;
                continue;
            }

            match self.archive_one(&store, &name)? {
                Candidate::Archived => report.archived.push(name),
                Candidate::Existing => report.skipped_existing += 1,
                Candidate::Open => report.skipped_open += 1,
            }
        }

        info!(
            archived = report.archived.len(),
            skipped_existing = report.skipped_existing,
            skipped_open = report.skipped_open,
            "archive pass complete"
        );
        Ok(report)
    }

    fn archive_one(&self, store: &ArtifactStore, name: &str) -> VaultResult<Candidate> {
        if store.segment_variants_exist(name) {
            return Ok(Candidate::Existing);
        }

        let source = self.source_dir.join(name);
        let size_before = fs::metadata(&source)?.len();
        if size_before == 0 {
            debug!(segment = name, "skipping empty segment");
            return Ok(Candidate::Open);
        }

        let raw = fs::read(&source)
            .map_err(|e| VaultError::Io(format!("Failed to read segment {}: {}", name, e)))?;
        let size_after = fs::metadata(&source)?.len();
        if raw.len() as u64 != size_before || size_after != size_before {
            warn!(segment = name, size_before, size_after, "segment changed while reading; skipping");
            return Ok(Candidate::Open);
        }

        let chain = self.codec.chain();
        let encoded = self.codec.encode(&raw, chain).map_err(|e| match e {
            VaultError::Codec { stage, message } => VaultError::Codec {
                stage,
                message: format!("segment {}: {}", name, message),
            },
            other => other,
        })?;

        let dest = self.paths.wal_dir().join(chain.file_name(name));
        write_bytes_atomic(&dest, &encoded)?;
        debug!(segment = name, chain = %chain, bytes = encoded.len(), "archived segment");
        Ok(Candidate::Archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::CodecSettings;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct SegmentEngine {
        current: RefCell<Option<String>>,
        switches: RefCell<u32>,
    }

    impl SourceEngine for SegmentEngine {
        fn describe(&self) -> String {
            "segments".into()
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
            Ok(self.current.borrow().clone())
        }
        fn switch_segment(&self) -> VaultResult<()> {
            *self.switches.borrow_mut() += 1;
            Ok(())
        }
    }

    fn setup() -> (TempDir, VaultPaths, PathBuf) {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp.path().join("store"));
        paths.ensure_directories().unwrap();
        let source = temp.path().join("pg_wal");
        fs::create_dir_all(&source).unwrap();
        (temp, paths, source)
    }

    fn engine(current: Option<&str>) -> SegmentEngine {
        SegmentEngine {
            current: RefCell::new(current.map(String::from)),
            switches: RefCell::new(0),
        }
    }

    #[test]
    fn test_archives_closed_segments_only() {
        let (_temp, paths, source) = setup();
        fs::write(source.join("000000010000000000000001"), vec![1u8; 4096]).unwrap();
        fs::write(source.join("000000010000000000000002"), vec![2u8; 4096]).unwrap();
        fs::write(source.join("000000010000000000000003"), vec![3u8; 4096]).unwrap();
        fs::write(source.join("000000010000000000000004"), vec![0u8; 4096]).unwrap();
        fs::write(source.join("00000002.history"), b"1\t0/3000000\tbefore").unwrap();
        fs::create_dir_all(source.join("archive_status")).unwrap();

        let codec = ArtifactCodec::new(&CodecSettings::default(), None).unwrap();
        let engine = engine(Some("000000010000000000000003"));
        let report = LogArchiver::new(&paths, &source, &codec, &engine)
            .archive()
            .unwrap();

        assert_eq!(
            report.archived,
            vec![
                "000000010000000000000001".to_string(),
                "000000010000000000000002".to_string(),
                "00000002.history".to_string(),
            ]
        );
        assert_eq!(report.skipped_open, 2);
        assert!(paths.wal_dir().join("000000010000000000000001.gz").is_file());
        assert!(!paths.wal_dir().join("000000010000000000000003.gz").exists());
    }

    #[test]
    fn test_second_pass_archives_nothing() {
        let (_temp, paths, source) = setup();
        fs::write(source.join("000000010000000000000001"), vec![1u8; 4096]).unwrap();

        let codec = ArtifactCodec::plain();
        let engine = engine(Some("000000010000000000000002"));
        let archiver = LogArchiver::new(&paths, &source, &codec, &engine);

        assert_eq!(archiver.archive().unwrap().archived.len(), 1);
        let second = archiver.archive().unwrap();
        assert!(second.archived.is_empty());
        assert_eq!(second.skipped_existing, 1);
    }

    #[test]
    fn test_existing_variant_under_other_chain_counts() {
        let (_temp, paths, source) = setup();
        fs::write(source.join("000000010000000000000001"), vec![1u8; 64]).unwrap();
        fs::write(paths.wal_dir().join("000000010000000000000001.gz.enc"), b"x").unwrap();

        let codec = ArtifactCodec::plain();
        let engine = engine(Some("000000010000000000000002"));
        let report = LogArchiver::new(&paths, &source, &codec, &engine)
            .archive()
            .unwrap();
        assert!(report.archived.is_empty());
        assert_eq!(report.skipped_existing, 1);
        assert!(!paths.wal_dir().join("000000010000000000000001").exists());
    }

    #[test]
    fn test_newest_segment_held_back_without_position() {
        let (_temp, paths, source) = setup();
        let closed = source.join("000000010000000000000006");
        let open = source.join("000000010000000000000007");
        fs::write(&closed, vec![6u8; 16384]).unwrap();

        // Preallocated at full size, only the head written so far
        let mut partial = vec![0u8; 16384];
        partial[..100].fill(7);
        fs::write(&open, &partial).unwrap();

        let codec = ArtifactCodec::plain();
        let engine = engine(None);
        let archiver = LogArchiver::new(&paths, &source, &codec, &engine);

        let first = archiver.archive().unwrap();
        assert_eq!(first.archived, vec!["000000010000000000000006".to_string()]);
        assert_eq!(first.skipped_open, 1);
        assert!(!paths.wal_dir().join("000000010000000000000007").exists());

        // The engine finishes segment 7 and moves on to 8
        fs::write(&open, vec![7u8; 16384]).unwrap();
        fs::write(source.join("000000010000000000000008"), vec![0u8; 16384]).unwrap();

        let second = archiver.archive().unwrap();
        assert_eq!(second.archived, vec!["000000010000000000000007".to_string()]);
        assert_eq!(
            fs::read(paths.wal_dir().join("000000010000000000000007")).unwrap(),
            vec![7u8; 16384]
        );
    }

    #[test]
    fn test_empty_segment_skipped() {
        let (_temp, paths, source) = setup();
        fs::write(source.join("000000010000000000000001"), b"").unwrap();

        let codec = ArtifactCodec::plain();
        let engine = engine(None);
        let report = LogArchiver::new(&paths, &source, &codec, &engine)
            .archive()
            .unwrap();
        assert_eq!(report.skipped_open, 1);
    }

    #[test]
    fn test_force_cut_switches_first() {
        let (_temp, paths, source) = setup();
        let codec = ArtifactCodec::plain();
        let engine = engine(None);
        let report = LogArchiver::new(&paths, &source, &codec, &engine)
            .force_cut()
            .unwrap();
        assert!(report.archived.is_empty());
        assert_eq!(*engine.switches.borrow(), 1);
    }

    #[test]
    fn test_locked_while_archiving() {
        let (_temp, paths, source) = setup();
        let _held = ClassLock::acquire(&paths, ArtifactClass::Wal, "wal").unwrap();

        let codec = ArtifactCodec::plain();
        let engine = engine(None);
        let err = LogArchiver::new(&paths, &source, &codec, &engine)
            .archive()
            .unwrap_err();
        assert!(matches!(err, VaultError::Locked { .. }));
    }

    #[test]
    fn test_missing_source_dir() {
        let (temp, paths, _source) = setup();
        let codec = ArtifactCodec::plain();
        let engine = engine(None);
        let err = LogArchiver::new(&paths, &temp.path().join("nope"), &codec, &engine)
            .archive()
            .unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }
}
