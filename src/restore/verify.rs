//! Artifact verification
//!
//! A lightweight integrity check that reads an artifact end to end without
//! writing anything: the decoded stream goes into a sink. Problems are
//! collected into the report rather than returned as errors so one run shows
//! everything that is wrong with an artifact.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::codec::ArtifactCodec;
use crate::error::{VaultError, VaultResult};
use crate::models::{parse_artifact_id, ArtifactClass, SnapshotFormat, METADATA_FILE};
use crate::storage::store::read_snapshot;
use crate::storage::tarball;

/// What kind of artifact was checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedKind {
    Snapshot,
    Segment,
    OffsitePackage,
}

impl std::fmt::Display for VerifiedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifiedKind::Snapshot => write!(f, "snapshot"),
            VerifiedKind::Segment => write!(f, "segment"),
            VerifiedKind::OffsitePackage => write!(f, "offsite package"),
        }
    }
}

/// Result of verifying one artifact
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub artifact: PathBuf,
    pub kind: VerifiedKind,
    pub passed: bool,
    pub problems: Vec<String>,
    /// Snapshot sidecar present
    pub has_metadata: bool,
    pub has_payload: bool,
    /// `None` when the artifact carries no checksum
    pub checksum_ok: Option<bool>,
    /// Archive entries or files walked
    pub entries: Option<u64>,
    /// Decoded size of a segment
    pub decoded_bytes: Option<u64>,
}

impl VerificationReport {
    fn new(artifact: &Path, kind: VerifiedKind) -> Self {
        Self {
            artifact: artifact.to_path_buf(),
            kind,
            passed: false,
            problems: Vec::new(),
            has_metadata: false,
            has_payload: false,
            checksum_ok: None,
            entries: None,
            decoded_bytes: None,
        }
    }

    fn finish(mut self) -> Self {
        self.passed = self.problems.is_empty();
        self
    }

    /// Get a summary of the outcome
    pub fn summary(&self) -> String {
        if self.passed {
            let mut detail = Vec::new();
            if let Some(entries) = self.entries {
                detail.push(format!("{} entries", entries));
            }
            if let Some(bytes) = self.decoded_bytes {
                detail.push(format!("{} bytes decoded", bytes));
            }
            if self.checksum_ok == Some(true) {
                detail.push("checksum ok".to_string());
            }
            format!("{} OK ({})", self.kind, detail.join(", "))
        } else {
            format!("{} FAILED: {}", self.kind, self.problems.join("; "))
        }
    }
}

/// Checks artifacts without modifying the store
pub struct Verifier<'a> {
    codec: &'a ArtifactCodec,
}

impl<'a> Verifier<'a> {
    pub fn new(codec: &'a ArtifactCodec) -> Self {
        Self { codec }
    }

    /// Verify the artifact at `path`
    pub fn verify(&self, path: &Path) -> VaultResult<VerificationReport> {
        let report = if path.is_dir() {
            self.verify_snapshot(path)
        } else if is_offsite_package(path) {
            self.verify_package(path)
        } else {
            self.verify_segment(path)
        };

        info!(artifact = %path.display(), passed = report.passed, "verification finished");
        Ok(report)
    }

    fn verify_snapshot(&self, dir: &Path) -> VerificationReport {
        let mut report = VerificationReport::new(dir, VerifiedKind::Snapshot);
        report.has_metadata = dir.join(METADATA_FILE).is_file();
        if !report.has_metadata {
            report.problems.push(format!("missing {}", METADATA_FILE));
            return report.finish();
        }

        let snapshot = match read_snapshot(dir) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                report.problems.push(e.to_string());
                return report.finish();
            }
        };

        let payload = snapshot.payload_path();
        report.has_payload = payload.exists();
        if !report.has_payload {
            report
                .problems
                .push(format!("missing payload {}", snapshot.metadata.payload));
            return report.finish();
        }

        match snapshot.metadata.format {
            SnapshotFormat::Streamed => {
                let files = WalkDir::new(&payload)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .count() as u64;
                if files == 0 {
                    report.problems.push("streamed payload is empty".to_string());
                }
                report.entries = Some(files);
            }
            SnapshotFormat::Packaged => {
                if let Some(expected) = &snapshot.metadata.checksum {
                    match tarball::sha256_file(&payload) {
                        Ok(actual) => {
                            let ok = &actual == expected;
                            report.checksum_ok = Some(ok);
                            if !ok {
                                report.problems.push(format!(
                                    "checksum mismatch (expected {}, found {})",
                                    expected, actual
                                ));
                            }
                        }
                        Err(e) => report.problems.push(e.to_string()),
                    }
                }

                match self
                    .codec
                    .read_decoded(&payload, |stream| tarball::count_entries(stream))
                {
                    Ok(entries) => report.entries = Some(entries),
                    Err(e) => report.problems.push(e.to_string()),
                }
            }
        }

        report.finish()
    }

    fn verify_segment(&self, path: &Path) -> VerificationReport {
        let mut report = VerificationReport::new(path, VerifiedKind::Segment);
        report.has_payload = path.is_file();
        if !report.has_payload {
            report.problems.push("file does not exist".to_string());
            return report.finish();
        }

        match self.codec.validate_file(path) {
            Ok(bytes) => {
                if bytes == 0 {
                    report.problems.push("segment is empty".to_string());
                }
                report.decoded_bytes = Some(bytes);
            }
            Err(e) => report.problems.push(e.to_string()),
        }
        report.finish()
    }

    fn verify_package(&self, path: &Path) -> VerificationReport {
        let mut report = VerificationReport::new(path, VerifiedKind::OffsitePackage);
        report.has_payload = true;

        match File::open(path)
            .map_err(VaultError::from)
            .and_then(|file| tarball::count_entries(BufReader::new(file)))
        {
            Ok(entries) => report.entries = Some(entries),
            Err(e) => report.problems.push(e.to_string()),
        }
        report.finish()
    }
}

fn is_offsite_package(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_artifact_id)
        .map(|(class, _)| class == ArtifactClass::Offsite)
        .unwrap_or(false)
}
