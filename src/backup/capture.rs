//! Snapshot capture
//!
//! Produces one consistent, timestamped snapshot per invocation. The work
//! happens in `<class>/<id>.partial/`; the directory is renamed to its final
//! name only after the payload and `metadata.json` are fully written, so a
//! crash at any point leaves nothing that looks complete.

use std::fs;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::codec::{ArtifactCodec, EncodingChain};
use crate::config::{Settings, VaultPaths};
use crate::engine::{self, SourceEngine};
use crate::error::{VaultError, VaultResult};
use crate::models::{
    artifact_id, ArtifactClass, SnapshotArtifact, SnapshotFormat, SnapshotMetadata, Trigger,
    METADATA_FILE, PACKAGED_PAYLOAD, PARTIAL_SUFFIX, STREAMED_PAYLOAD,
};
use crate::storage::{disk_usage, tarball, write_json_atomic, ArtifactStore, ClassLock};

/// What to capture and why
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub class: ArtifactClass,
    pub trigger: Trigger,
    pub label: Option<String>,
}

impl CaptureRequest {
    pub fn new(class: ArtifactClass) -> Self {
        Self {
            class,
            trigger: Trigger::Scheduled,
            label: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

/// Takes snapshots through the engine's native base-copy mechanism
pub struct SnapshotCapture<'a> {
    paths: &'a VaultPaths,
    settings: &'a Settings,
    codec: &'a ArtifactCodec,
    engine: &'a dyn SourceEngine,
}

impl<'a> SnapshotCapture<'a> {
    pub fn new(
        paths: &'a VaultPaths,
        settings: &'a Settings,
        codec: &'a ArtifactCodec,
        engine: &'a dyn SourceEngine,
    ) -> Self {
        Self {
            paths,
            settings,
            codec,
            engine,
        }
    }

    /// Capture a new snapshot of `request.class`
    pub fn capture(&self, request: &CaptureRequest) -> VaultResult<SnapshotArtifact> {
        let class = request.class;
        if !class.is_snapshot() {
            return Err(VaultError::Validation(format!(
                "{} artifacts are not snapshots",
                class
            )));
        }

        engine::preflight(self.engine, &self.settings.source)?;

        let _lock = ClassLock::acquire(self.paths, class, class.dir_name())?;
        self.sweep_partials(class)?;

        let class_dir = self.paths.class_dir(class);
        fs::create_dir_all(&class_dir)?;

        let created_at = self.unique_timestamp(class, Utc::now());
        let id = artifact_id(class, created_at);
        let partial_dir = class_dir.join(format!("{}{}", id, PARTIAL_SUFFIX));
        let final_dir = class_dir.join(&id);

        info!(snapshot = %id, source = %self.engine.describe(), "capturing snapshot");
        let started = Instant::now();

        fs::create_dir_all(&partial_dir).map_err(|e| {
            VaultError::Capture(format!("Failed to create {}: {}", partial_dir.display(), e))
        })?;

        let metadata = match self.fill(&partial_dir, &id, created_at, request) {
            Ok(metadata) => metadata,
            Err(e) => {
                discard(&partial_dir);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial_dir, &final_dir) {
            discard(&partial_dir);
            return Err(VaultError::Capture(format!(
                "Failed to finalize {}: {}",
                final_dir.display(),
                e
            )));
        }

        info!(
            snapshot = %id,
            format = %metadata.format,
            chain = %metadata.chain,
            size_bytes = metadata.size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot stored"
        );

        Ok(SnapshotArtifact {
            metadata,
            dir: final_dir,
        })
    }

    /// Capture, package and describe into `partial_dir`
    fn fill(
        &self,
        partial_dir: &Path,
        id: &str,
        created_at: DateTime<Utc>,
        request: &CaptureRequest,
    ) -> VaultResult<SnapshotMetadata> {
        let data_dir = partial_dir.join(STREAMED_PAYLOAD);
        fs::create_dir_all(&data_dir)?;

        self.engine.base_backup(&data_dir)?;
        let engine_version = self.engine.server_version()?;

        if fs::read_dir(&data_dir)?.next().is_none() {
            return Err(VaultError::Capture(format!(
                "base copy of {} produced no files",
                self.engine.describe()
            )));
        }
        let raw_size = disk_usage(&data_dir);

        let (payload, size_bytes, checksum, chain) = match self.settings.snapshot_format {
            SnapshotFormat::Streamed => (STREAMED_PAYLOAD.to_string(), raw_size, None, EncodingChain::Plain),
            SnapshotFormat::Packaged => {
                let tar_path = partial_dir.join(PACKAGED_PAYLOAD);
                let entries = tarball::pack_directory(&data_dir, &tar_path)?;
                fs::remove_dir_all(&data_dir)?;
                debug!(snapshot = %id, entries, "packaged snapshot tree");

                let chain = self.codec.chain();
                let payload_path = if chain == EncodingChain::Plain {
                    tar_path
                } else {
                    let encoded = self.codec.encode_file(&tar_path, partial_dir, PACKAGED_PAYLOAD)?;
                    fs::remove_file(&tar_path)?;
                    encoded.path
                };

                let size = fs::metadata(&payload_path)?.len();
                let checksum = tarball::sha256_file(&payload_path)?;
                (chain.file_name(PACKAGED_PAYLOAD), size, Some(checksum), chain)
            }
        };

        let metadata = SnapshotMetadata {
            schema_version: 1,
            id: id.to_string(),
            class: request.class,
            created_at,
            format: self.settings.snapshot_format,
            chain,
            payload,
            size_bytes,
            raw_size_bytes: raw_size,
            checksum,
            engine_version,
            trigger: request.trigger,
            label: request.label.clone(),
            source: self.engine.describe(),
        };

        write_json_atomic(partial_dir.join(METADATA_FILE), &metadata)?;
        Ok(metadata)
    }

    /// Remove leftovers of captures that never finished
    fn sweep_partials(&self, class: ArtifactClass) -> VaultResult<()> {
        let store = ArtifactStore::new(self.paths.clone());
        for partial in store.list_partials(class)? {
            warn!(path = %partial.display(), "removing incomplete capture");
            discard(&partial);
        }
        Ok(())
    }

    /// Identities have millisecond resolution; never reuse one
    fn unique_timestamp(&self, class: ArtifactClass, mut at: DateTime<Utc>) -> DateTime<Utc> {
        let class_dir = self.paths.class_dir(class);
        while class_dir.join(artifact_id(class, at)).exists() {
            at += Duration::milliseconds(1);
        }
        at
    }
}

/// Best-effort removal of a partial artifact
pub(crate) fn discard(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to remove partial artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Engine whose "data directory" is a fixed tree on disk
    struct TreeEngine {
        fail_copy: bool,
        copies: Cell<u32>,
    }

    impl SourceEngine for TreeEngine {
        fn describe(&self) -> String {
            "tree:5432".into()
        }
        fn ping(&self) -> VaultResult<()> {
            Ok(())
        }
        fn check_privileges(&self) -> VaultResult<()> {
            Ok(())
        }
        fn server_version(&self) -> VaultResult<String> {
            Ok("16.4".into())
        }
        fn base_backup(&self, dest: &Path) -> VaultResult<()> {
            self.copies.set(self.copies.get() + 1);
            fs::write(dest.join("PG_VERSION"), "16\n")?;
            if self.fail_copy {
                return Err(VaultError::Capture("copy interrupted".into()));
            }
            fs::create_dir_all(dest.join("global"))?;
            fs::write(dest.join("global").join("pg_control"), vec![3u8; 512])?;
            Ok(())
        }
        fn current_segment(&self) -> VaultResult<Option<String>> {
            Ok(None)
        }
        fn switch_segment(&self) -> VaultResult<()> {
            Ok(())
        }
    }

    fn setup() -> (TempDir, VaultPaths, Settings) {
        let temp = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp.path().join("store"));
        paths.ensure_directories().unwrap();
        (temp, paths, Settings::default())
    }

    fn engine(fail_copy: bool) -> TreeEngine {
        TreeEngine {
            fail_copy,
            copies: Cell::new(0),
        }
    }

    #[test]
    fn test_packaged_capture() {
        let (_temp, paths, settings) = setup();
        let codec = ArtifactCodec::new(&settings.codec, None).unwrap();
        let engine = engine(false);
        let capture = SnapshotCapture::new(&paths, &settings, &codec, &engine);

        let snapshot = capture
            .capture(&CaptureRequest::new(ArtifactClass::Full).with_label(Some("nightly".into())))
            .unwrap();

        assert!(snapshot.dir.join(METADATA_FILE).is_file());
        assert_eq!(snapshot.metadata.payload, "base.tar.gz");
        assert!(snapshot.payload_path().is_file());
        assert!(!snapshot.dir.join(STREAMED_PAYLOAD).exists());
        assert_eq!(snapshot.metadata.engine_version, "16.4");
        assert_eq!(snapshot.metadata.label.as_deref(), Some("nightly"));
        assert_eq!(
            snapshot.metadata.checksum.as_deref(),
            Some(tarball::sha256_file(&snapshot.payload_path()).unwrap().as_str())
        );
        assert!(!paths.lock_file(ArtifactClass::Full).exists());
    }

    #[test]
    fn test_streamed_capture_keeps_tree() {
        let (_temp, paths, mut settings) = setup();
        settings.snapshot_format = SnapshotFormat::Streamed;
        settings.codec.compress = false;
        let codec = ArtifactCodec::new(&settings.codec, None).unwrap();
        let engine = engine(false);
        let capture = SnapshotCapture::new(&paths, &settings, &codec, &engine);

        let snapshot = capture.capture(&CaptureRequest::new(ArtifactClass::Base)).unwrap();
        assert_eq!(snapshot.metadata.chain, EncodingChain::Plain);
        assert!(snapshot.payload_path().join("global").join("pg_control").is_file());
        assert!(snapshot.metadata.checksum.is_none());
        assert_eq!(snapshot.metadata.size_bytes, 515);
    }

    #[test]
    fn test_every_invocation_creates_a_new_snapshot() {
        let (_temp, paths, settings) = setup();
        let codec = ArtifactCodec::new(&settings.codec, None).unwrap();
        let engine = engine(false);
        let capture = SnapshotCapture::new(&paths, &settings, &codec, &engine);

        let first = capture.capture(&CaptureRequest::new(ArtifactClass::Full)).unwrap();
        let second = capture.capture(&CaptureRequest::new(ArtifactClass::Full)).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(engine.copies.get(), 2);
    }

    #[test]
    fn test_failed_capture_leaves_nothing() {
        let (_temp, paths, settings) = setup();
        let codec = ArtifactCodec::new(&settings.codec, None).unwrap();
        let engine = engine(true);
        let capture = SnapshotCapture::new(&paths, &settings, &codec, &engine);

        let err = capture.capture(&CaptureRequest::new(ArtifactClass::Full)).unwrap_err();
        assert!(matches!(err, VaultError::Capture(_)));
        assert_eq!(
            fs::read_dir(paths.class_dir(ArtifactClass::Full)).unwrap().count(),
            0
        );
    }

    #[test]
    fn test_stale_partial_is_swept() {
        let (_temp, paths, settings) = setup();
        let stale = paths
            .class_dir(ArtifactClass::Full)
            .join("full_20200101T000000.000Z.partial");
        fs::create_dir_all(stale.join("data")).unwrap();

        let codec = ArtifactCodec::new(&settings.codec, None).unwrap();
        let engine = engine(false);
        SnapshotCapture::new(&paths, &settings, &codec, &engine)
            .capture(&CaptureRequest::new(ArtifactClass::Full))
            .unwrap();

        assert!(!stale.exists());
    }

    #[test]
    fn test_wal_is_not_a_snapshot_class() {
        let (_temp, paths, settings) = setup();
        let codec = ArtifactCodec::plain();
        let engine = engine(false);
        let err = SnapshotCapture::new(&paths, &settings, &codec, &engine)
            .capture(&CaptureRequest::new(ArtifactClass::Wal))
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }
}
