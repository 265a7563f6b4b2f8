//! Recovery descriptor
//!
//! Tells the engine's own recovery subsystem where to find archived
//! segments, how far to replay, and what to do afterwards. walvault never
//! performs the replay itself.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::storage::{read_json_required, write_json_atomic};

/// Sidecar written into the staging root
pub const DESCRIPTOR_FILE: &str = "walvault-recovery.json";

/// Presence of this file in a data directory puts the engine into targeted recovery
pub const SIGNAL_FILE: &str = "recovery.signal";

/// Engine configuration file that directives are appended to
pub const AUTO_CONF_FILE: &str = "postgresql.auto.conf";

/// What the engine does once it reaches the recovery target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    #[default]
    Promote,
}

impl RecoveryAction {
    fn directive_value(&self) -> &'static str {
        match self {
            RecoveryAction::Promote => "promote",
        }
    }
}

/// Everything the engine needs to finish a staged restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryDescriptor {
    pub staging_path: PathBuf,
    /// Staged data directory the engine is started on
    pub data_dir: PathBuf,
    /// Replay stops here; `None` replays every available segment
    pub target_time: Option<DateTime<Utc>>,
    /// Directory of decoded segments the restore command copies from
    pub replay_source: PathBuf,
    pub action: RecoveryAction,
    pub base_snapshot: String,
    pub segment_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Quote a value for the engine's configuration file
fn conf_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl RecoveryDescriptor {
    /// Engine directives, one per line
    pub fn directives(&self) -> String {
        let restore_command = format!("cp \"{}/%f\" \"%p\"", self.replay_source.display());

        let mut lines = vec![
            format!(
                "# walvault recovery for {} ({})",
                self.base_snapshot,
                self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            format!("restore_command = {}", conf_quote(&restore_command)),
        ];
        if let Some(target) = self.target_time {
            lines.push(format!(
                "recovery_target_time = {}",
                conf_quote(&target.format("%Y-%m-%d %H:%M:%S%.f+00").to_string())
            ));
        }
        lines.push(format!(
            "recovery_target_action = {}",
            conf_quote(self.action.directive_value())
        ));

        lines.join("\n") + "\n"
    }

    /// Render into the staged data directory and the staging root
    pub fn write(&self) -> VaultResult<()> {
        let conf = self.data_dir.join(AUTO_CONF_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&conf)
            .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", conf.display(), e)))?;
        write!(file, "\n{}", self.directives())
            .map_err(|e| VaultError::Io(format!("Failed to write {}: {}", conf.display(), e)))?;
        file.sync_all()?;

        fs::write(self.data_dir.join(SIGNAL_FILE), b"")?;

        write_json_atomic(self.staging_path.join(DESCRIPTOR_FILE), self)
    }

    /// Read the descriptor of a staged restore
    pub fn load(staging_root: &Path) -> VaultResult<Self> {
        read_json_required(staging_root.join(DESCRIPTOR_FILE))
    }
}
