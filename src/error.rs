//! Custom error types for walvault
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Each variant names the pipeline stage that
//! failed so operators can tell from the message alone where to look.

use std::fmt;

use thiserror::Error;

/// The codec stage in which a transform failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecStage {
    Compress,
    Decompress,
    Encrypt,
    Decrypt,
}

impl fmt::Display for CodecStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecStage::Compress => write!(f, "compress"),
            CodecStage::Decompress => write!(f, "decompress"),
            CodecStage::Encrypt => write!(f, "encrypt"),
            CodecStage::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// The main error type for walvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// A required option is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source engine could not be reached
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The snapshot mechanism reported a failure or incomplete output
    #[error("Capture failure: {0}")]
    Capture(String),

    /// A codec transform failed
    #[error("Codec failure ({stage}): {message}")]
    Codec { stage: CodecStage, message: String },

    /// Offsite copy failed
    #[error("Transfer failure: {0}")]
    Transfer(String),

    /// Verification detected corruption
    #[error("Integrity failure: {0}")]
    Integrity(String),

    /// Another invocation holds the class lock
    #[error("{class} operations are locked by another run ({holder})")]
    Locked { class: String, holder: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Invalid input or store state
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl VaultError {
    /// Create a codec failure for the given stage
    pub fn codec(stage: CodecStage, message: impl Into<String>) -> Self {
        Self::Codec {
            stage,
            message: message.into(),
        }
    }

    /// Create a "not found" error for snapshots
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Snapshot",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error when no base snapshot exists to build on
    pub fn base_snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Base snapshot",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for any stored artifact
    pub fn artifact_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Artifact",
            identifier: identifier.into(),
        }
    }

    /// Append `note` to the message, keeping the error kind
    pub fn with_note(self, note: impl fmt::Display) -> Self {
        match self {
            Self::Config(m) => Self::Config(format!("{}; {}", m, note)),
            Self::Connectivity(m) => Self::Connectivity(format!("{}; {}", m, note)),
            Self::Capture(m) => Self::Capture(format!("{}; {}", m, note)),
            Self::Codec { stage, message } => Self::Codec {
                stage,
                message: format!("{}; {}", message, note),
            },
            Self::Transfer(m) => Self::Transfer(format!("{}; {}", m, note)),
            Self::Integrity(m) => Self::Integrity(format!("{}; {}", m, note)),
            Self::Locked { class, holder } => Self::Locked {
                class,
                holder: format!("{}; {}", holder, note),
            },
            Self::NotFound {
                entity_type,
                identifier,
            } => Self::NotFound {
                entity_type,
                identifier: format!("{}; {}", identifier, note),
            },
            Self::Validation(m) => Self::Validation(format!("{}; {}", m, note)),
            Self::Io(m) => Self::Io(format!("{}; {}", m, note)),
            Self::Json(m) => Self::Json(format!("{}; {}", m, note)),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if decryption failed (wrong password or tampered ciphertext)
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            Self::Codec {
                stage: CodecStage::Decrypt,
                ..
            }
        )
    }

    /// Check if decompression failed (corrupt stream)
    pub fn is_decompression_failure(&self) -> bool {
        matches!(
            self,
            Self::Codec {
                stage: CodecStage::Decompress,
                ..
            }
        )
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Validation(_) => 2,
            Self::Connectivity(_) => 3,
            Self::Capture(_) => 4,
            Self::Codec { .. } => 5,
            Self::Transfer(_) => 6,
            Self::Integrity(_) => 7,
            Self::Locked { .. } => 8,
            Self::NotFound { .. } => 9,
            Self::Io(_) | Self::Json(_) => 1,
        }
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for walvault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::Config("retention.full_days must be positive".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: retention.full_days must be positive"
        );
    }

    #[test]
    fn test_codec_stages_are_distinguishable() {
        let decrypt = VaultError::codec(CodecStage::Decrypt, "authentication failed");
        let decompress = VaultError::codec(CodecStage::Decompress, "corrupt deflate stream");

        assert!(decrypt.is_decryption_failure());
        assert!(!decrypt.is_decompression_failure());
        assert!(decompress.is_decompression_failure());
        assert!(!decompress.is_decryption_failure());
        assert_eq!(
            decrypt.to_string(),
            "Codec failure (decrypt): authentication failed"
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = VaultError::snapshot_not_found("latest");
        assert_eq!(err.to_string(), "Snapshot not found: latest");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_base_snapshot_not_found() {
        let err = VaultError::base_snapshot_not_found("latest");
        assert_eq!(err.to_string(), "Base snapshot not found: latest");
        assert_eq!(err.exit_code(), 9);
    }

    #[test]
    fn test_with_note_keeps_kind() {
        let err = VaultError::codec(CodecStage::Decrypt, "authentication failed")
            .with_note("previous data directory left at /srv/pgdata.pre-restore-1");
        assert!(err.is_decryption_failure());
        assert_eq!(
            err.to_string(),
            "Codec failure (decrypt): authentication failed; previous data directory left at /srv/pgdata.pre-restore-1"
        );

        let err = VaultError::Io("disk full".into()).with_note("while restoring");
        assert!(matches!(err, VaultError::Io(ref m) if m == "disk full; while restoring"));
    }

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let codes = [
            VaultError::Config(String::new()).exit_code(),
            VaultError::Connectivity(String::new()).exit_code(),
            VaultError::Capture(String::new()).exit_code(),
            VaultError::codec(CodecStage::Decrypt, "").exit_code(),
            VaultError::Transfer(String::new()).exit_code(),
            VaultError::Integrity(String::new()).exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let vault_err: VaultError = io_err.into();
        assert!(matches!(vault_err, VaultError::Io(_)));
    }
}
