//! File I/O utilities with atomic writes
//!
//! Every artifact and sidecar reaches its final name in one rename, so a
//! reader never observes a half-written file under a name it trusts.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{VaultError, VaultResult};

/// Suffix of in-flight temporary files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Sibling temp path for `path` (`<file name>.tmp`)
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            VaultError::Io(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Write through `fill`, sync, then rename into place
fn write_atomic_with<F>(path: &Path, fill: F) -> VaultResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> VaultResult<()>,
{
    ensure_parent(path)?;

    let temp_path = temp_path_for(path);
    let result = (|| {
        let file = File::create(&temp_path).map_err(|e| {
            VaultError::Io(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;

        writer
            .flush()
            .map_err(|e| VaultError::Io(format!("Failed to flush {}: {}", path.display(), e)))?;

        // Sync to disk before rename
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| VaultError::Io(format!("Failed to sync {}: {}", path.display(), e)))?;

        fs::rename(&temp_path, path).map_err(|e| {
            VaultError::Io(format!(
                "Failed to move {} into place: {}",
                path.display(),
                e
            ))
        })
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Read JSON from a file, returning an error if the file doesn't exist
pub fn read_json_required<T, P>(path: P) -> VaultResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| VaultError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> VaultResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    write_atomic_with(path, |writer| {
        serde_json::to_writer_pretty(writer, data).map_err(|e| {
            VaultError::Json(format!("Failed to serialize {}: {}", path.display(), e))
        })
    })
}

/// Write raw bytes to a file atomically
pub fn write_bytes_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> VaultResult<()> {
    let path = path.as_ref();
    write_atomic_with(path, |writer| {
        writer
            .write_all(data)
            .map_err(|e| VaultError::Io(format!("Failed to write {}: {}", path.display(), e)))
    })
}

/// Whether `name` is a temp file left by an interrupted atomic write
pub fn is_temp_name(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}
