//! Snapshot artifact model
//!
//! A snapshot lives in a directory named `<class>_<UTC timestamp>`. The
//! directory carries the payload (a packaged tar archive or a streamed
//! directory tree) and a `metadata.json` sidecar. A directory still carrying
//! the `.partial` suffix was never completed and must not be trusted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::EncodingChain;
use crate::error::VaultError;

/// Timestamp layout used in artifact identities
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Suffix marking an artifact whose capture has not completed
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Name of the metadata sidecar inside a snapshot directory
pub const METADATA_FILE: &str = "metadata.json";

/// Payload name of a packaged snapshot, before the chain suffix
pub const PACKAGED_PAYLOAD: &str = "base.tar";

/// Payload name of a streamed snapshot
pub const STREAMED_PAYLOAD: &str = "data";

/// Storage class of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactClass {
    /// Full snapshots taken by `full`
    Full,
    /// Base snapshots taken by `base` for incremental recovery
    Base,
    /// Archived log segments
    Wal,
    /// Offsite packages
    Offsite,
}

impl ArtifactClass {
    pub const ALL: [ArtifactClass; 4] = [
        ArtifactClass::Full,
        ArtifactClass::Base,
        ArtifactClass::Wal,
        ArtifactClass::Offsite,
    ];

    /// Name of the top-level store area and identity prefix
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactClass::Full => "full",
            ArtifactClass::Base => "base",
            ArtifactClass::Wal => "wal",
            ArtifactClass::Offsite => "offsite",
        }
    }

    /// Whether artifacts of this class are snapshot directories
    pub fn is_snapshot(&self) -> bool {
        matches!(self, ArtifactClass::Full | ArtifactClass::Base)
    }
}

impl fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl FromStr for ArtifactClass {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(ArtifactClass::Full),
            "base" => Ok(ArtifactClass::Base),
            "wal" | "incremental" => Ok(ArtifactClass::Wal),
            "offsite" | "remote" => Ok(ArtifactClass::Offsite),
            other => Err(VaultError::Validation(format!(
                "Unknown artifact class '{}' (expected full, base, wal or offsite)",
                other
            ))),
        }
    }
}

/// How a snapshot payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    /// Tar archive run through the artifact codec
    #[default]
    Packaged,
    /// Plain directory tree as written by the engine
    Streamed,
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFormat::Packaged => write!(f, "packaged"),
            SnapshotFormat::Streamed => write!(f, "streamed"),
        }
    }
}

/// What caused a snapshot to be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    #[default]
    Scheduled,
    OnDemand,
    PreRestore,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::OnDemand => write!(f, "on-demand"),
            Trigger::PreRestore => write!(f, "pre-restore"),
        }
    }
}

/// Contents of a snapshot's `metadata.json` sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub schema_version: u32,
    pub id: String,
    pub class: ArtifactClass,
    pub created_at: DateTime<Utc>,
    pub format: SnapshotFormat,
    pub chain: EncodingChain,
    /// Payload file or directory name inside the snapshot directory
    pub payload: String,
    /// Bytes stored on disk
    pub size_bytes: u64,
    /// Bytes before encoding
    pub raw_size_bytes: u64,
    /// SHA-256 of the stored payload (packaged snapshots only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub engine_version: String,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Connection target the snapshot was taken from
    pub source: String,
}

/// A completed snapshot found in the store
#[derive(Debug, Clone)]
pub struct SnapshotArtifact {
    pub metadata: SnapshotMetadata,
    /// Snapshot directory
    pub dir: PathBuf,
}

impl SnapshotArtifact {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn class(&self) -> ArtifactClass {
        self.metadata.class
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    /// Full path of the payload
    pub fn payload_path(&self) -> PathBuf {
        self.dir.join(&self.metadata.payload)
    }

    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.metadata.created_at)
    }
}

/// Build the identity of an artifact captured at `at`
pub fn artifact_id(class: ArtifactClass, at: DateTime<Utc>) -> String {
    format!("{}_{}", class.dir_name(), at.format(TIMESTAMP_FORMAT))
}

/// Parse an artifact identity back into its class and timestamp
///
/// Accepts a trailing `.partial` marker and any file extension after the
/// timestamp (offsite packages are `<id>.tar`).
pub fn parse_artifact_id(name: &str) -> Option<(ArtifactClass, DateTime<Utc>)> {
    let name = name.strip_suffix(PARTIAL_SUFFIX).unwrap_or(name);
    let (prefix, rest) = name.split_once('_')?;
    let class = ArtifactClass::from_str(prefix).ok()?;
    if class.dir_name() != prefix {
        return None;
    }

    // Timestamp ends at the 'Z'; anything after it is an extension
    let end = rest.find('Z')?;
    let naive = NaiveDateTime::parse_from_str(&rest[..=end], TIMESTAMP_FORMAT).ok()?;
    Some((class, DateTime::from_naive_utc_and_offset(naive, Utc)))
}

/// Whether a path names an incomplete artifact
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_artifact_id_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 5).unwrap()
            + Duration::milliseconds(250);
        let id = artifact_id(ArtifactClass::Full, at);
        assert_eq!(id, "full_20261016T020005.250Z");

        let (class, parsed) = parse_artifact_id(&id).unwrap();
        assert_eq!(class, ArtifactClass::Full);
        assert_eq!(parsed, at);
    }

    #[test]
    fn test_parse_partial_and_extension() {
        let (class, at) = parse_artifact_id("base_20251127T143022.456Z.partial").unwrap();
        assert_eq!(class, ArtifactClass::Base);
        assert_eq!(at.year(), 2025);
        assert_eq!(at.hour(), 14);

        let (class, _) = parse_artifact_id("offsite_20251127T143022.000Z.tar").unwrap();
        assert_eq!(class, ArtifactClass::Offsite);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(parse_artifact_id("backup-20251127-143022.json").is_none());
        assert!(parse_artifact_id("incremental_20251127T143022.000Z").is_none());
        assert!(parse_artifact_id("full_notatime").is_none());
    }

    #[test]
    fn test_class_from_str() {
        assert_eq!("FULL".parse::<ArtifactClass>().unwrap(), ArtifactClass::Full);
        assert_eq!(
            "incremental".parse::<ArtifactClass>().unwrap(),
            ArtifactClass::Wal
        );
        assert!("daily".parse::<ArtifactClass>().is_err());
    }

    #[test]
    fn test_is_partial() {
        assert!(is_partial(Path::new("/store/full/full_20251127T143022.000Z.partial")));
        assert!(!is_partial(Path::new("/store/full/full_20251127T143022.000Z")));
    }

    #[test]
    fn test_metadata_serde() {
        let metadata = SnapshotMetadata {
            schema_version: 1,
            id: "full_20251127T143022.000Z".into(),
            class: ArtifactClass::Full,
            created_at: Utc::now(),
            format: SnapshotFormat::Packaged,
            chain: EncodingChain::CompressedEncrypted,
            payload: "base.tar.gz.enc".into(),
            size_bytes: 10,
            raw_size_bytes: 20,
            checksum: Some("abc".into()),
            engine_version: "16.2".into(),
            trigger: Trigger::OnDemand,
            label: None,
            source: "localhost:5432".into(),
        };

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"on-demand\""));
        assert!(json.contains("\"compressed+encrypted\""));
        assert!(!json.contains("label"));

        let back: SnapshotMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
