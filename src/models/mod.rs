//! Core data models for walvault
//!
//! This module contains the artifact types stored in the vault:
//! - Snapshots (full and base) with their metadata sidecars
//! - Archived log segments
//! - Artifact classes and identity naming

pub mod artifact;
pub mod segment;

pub use artifact::{
    artifact_id, is_partial, parse_artifact_id, ArtifactClass, SnapshotArtifact,
    SnapshotFormat, SnapshotMetadata, Trigger, METADATA_FILE, PACKAGED_PAYLOAD,
    PARTIAL_SUFFIX, STREAMED_PAYLOAD, TIMESTAMP_FORMAT,
};
pub use segment::{
    is_archivable_name, is_history_name, is_wal_segment_name, parse_lsn, segment_name_for,
    ArchivedSegment,
};
