//! Append-only operation log
//!
//! Each entry is written as a single JSON line and flushed immediately.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

use super::entry::OperationEntry;

/// Writes operation entries to `logs/operations.jsonl`
#[derive(Debug, Clone)]
pub struct OperationLog {
    log_path: PathBuf,
}

impl OperationLog {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Append an entry
    pub fn record(&self, entry: &OperationEntry) -> VaultResult<()> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open operation log: {}", e)))?;

        let json = serde_json::to_string(entry)
            .map_err(|e| VaultError::Json(format!("Failed to serialize log entry: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| VaultError::Io(format!("Failed to write log entry: {}", e)))?;

        file.flush()
            .map_err(|e| VaultError::Io(format!("Failed to flush operation log: {}", e)))?;

        Ok(())
    }

    /// Read all entries, oldest first
    ///
    /// A torn final line from a killed run is skipped rather than failing
    /// the whole read.
    pub fn read_all(&self) -> VaultResult<Vec<OperationEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open operation log: {}", e)))?;

        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                VaultError::Io(format!(
                    "Failed to read operation log line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<OperationEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(line = line_num + 1, error = %e, "skipping unreadable log entry")
                }
            }
        }

        Ok(entries)
    }

    /// Read the most recent `count` entries
    pub fn read_recent(&self, count: usize) -> VaultResult<Vec<OperationEntry>> {
        let all_entries = self.read_all()?;
        let start = all_entries.len().saturating_sub(count);
        Ok(all_entries[start..].to_vec())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{OperationKind, Outcome};
    use tempfile::TempDir;

    fn create_test_log() -> (OperationLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = OperationLog::new(temp_dir.path().join("logs").join("operations.jsonl"));
        (log, temp_dir)
    }

    #[test]
    fn test_record_and_read() {
        let (log, _temp) = create_test_log();
        log.record(&OperationEntry::succeeded(
            OperationKind::BaseCapture,
            Some("base_20251127T143022.000Z".into()),
            "",
            10,
        ))
        .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, OperationKind::BaseCapture);
        assert_eq!(entries[0].outcome, Outcome::Succeeded);
    }

    #[test]
    fn test_read_recent() {
        let (log, _temp) = create_test_log();
        for i in 0..10 {
            log.record(&OperationEntry::succeeded(
                OperationKind::Archive,
                None,
                format!("{} archived", i),
                1,
            ))
            .unwrap();
        }

        let recent = log.read_recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].detail, "9 archived");
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let (log, _temp) = create_test_log();
        log.record(&OperationEntry::failed(OperationKind::Sweep, "boom", 1))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        write!(file, "{{\"id\": \"trunc").unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let (log, _temp) = create_test_log();
        assert!(log.read_recent(5).unwrap().is_empty());
    }
}
