//! Operation log entry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of operations recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    FullCapture,
    BaseCapture,
    Archive,
    Switch,
    Offsite,
    Restore,
    Prepare,
    Pitr,
    Verify,
    Sweep,
    Unlock,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::FullCapture => "full",
            OperationKind::BaseCapture => "base",
            OperationKind::Archive => "wal",
            OperationKind::Switch => "switch",
            OperationKind::Offsite => "remote",
            OperationKind::Restore => "restore",
            OperationKind::Prepare => "prepare",
            OperationKind::Pitr => "pitr",
            OperationKind::Verify => "verify",
            OperationKind::Sweep => "sweep",
            OperationKind::Unlock => "unlock",
        };
        write!(f, "{}", name)
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "ok"),
            Outcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// A single operation log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEntry {
    pub id: Uuid,

    /// When the operation finished (UTC)
    pub timestamp: DateTime<Utc>,

    pub operation: OperationKind,

    pub outcome: Outcome,

    /// Artifact produced or consumed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,

    /// Summary on success, error message on failure
    pub detail: String,

    pub duration_ms: u64,
}

impl OperationEntry {
    pub fn succeeded(
        operation: OperationKind,
        artifact: Option<String>,
        detail: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            outcome: Outcome::Succeeded,
            artifact,
            detail: detail.into(),
            duration_ms,
        }
    }

    pub fn failed(operation: OperationKind, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            outcome: Outcome::Failed,
            artifact: None,
            detail: detail.into(),
            duration_ms,
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.outcome
        );

        if let Some(artifact) = &self.artifact {
            output.push_str(&format!(" {}", artifact));
        }

        if !self.detail.is_empty() {
            output.push_str(&format!(" ({})", self.detail));
        }

        output
    }
}
