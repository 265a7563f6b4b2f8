//! Tar packaging of snapshot trees and offsite bundles

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tar::{Archive, Builder};
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

fn tar_error(action: &str, path: &Path, e: io::Error) -> VaultError {
    VaultError::Io(format!("tar {} failed for {}: {}", action, path.display(), e))
}

/// Append every entry under `src` to `builder`, named relative to `prefix`
///
/// Symlinks are stored as links, not followed. Returns the number of entries
/// appended.
pub fn append_tree<W: Write>(builder: &mut Builder<W>, src: &Path, prefix: &Path) -> VaultResult<u64> {
    builder.follow_symlinks(false);

    let mut count = 0;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            VaultError::Io(format!("Failed to walk {}: {}", src.display(), e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| VaultError::Io(e.to_string()))?;

        builder
            .append_path_with_name(entry.path(), prefix.join(relative))
            .map_err(|e| tar_error("append", entry.path(), e))?;
        count += 1;
    }
    Ok(count)
}

/// Package the contents of `src` into a tar file at `dest`
pub fn pack_directory(src: &Path, dest: &Path) -> VaultResult<u64> {
    let file = File::create(dest)
        .map_err(|e| VaultError::Io(format!("Failed to create {}: {}", dest.display(), e)))?;
    let mut builder = Builder::new(BufWriter::new(file));

    let count = append_tree(&mut builder, src, Path::new(""))?;

    let mut writer = builder
        .into_inner()
        .map_err(|e| tar_error("finish", dest, e))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(count)
}

/// Unpack a tar stream into `dest`
///
/// A payload that decoded cleanly but does not parse as tar means the
/// stored artifact is damaged.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> VaultResult<()> {
    Archive::new(reader).unpack(dest).map_err(|e| {
        VaultError::Integrity(format!(
            "snapshot payload is not a valid archive (unpacking into {}): {}",
            dest.display(),
            e
        ))
    })
}

/// Walk a tar stream into a sink, returning the entry count
pub fn count_entries<R: Read>(reader: R) -> VaultResult<u64> {
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| VaultError::Integrity(format!("unreadable archive: {}", e)))?;

    let mut count = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| VaultError::Integrity(format!("corrupt archive entry: {}", e)))?;
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| VaultError::Integrity(format!("truncated archive entry: {}", e)))?;
        count += 1;
    }
    Ok(count)
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> VaultResult<String> {
    let mut file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("base").join("1")).unwrap();
        fs::write(root.join("PG_VERSION"), "16\n").unwrap();
        fs::write(root.join("base").join("1").join("1259"), vec![9u8; 8192]).unwrap();
        fs::create_dir_all(root.join("pg_wal")).unwrap();
    }

    #[test]
    fn test_pack_and_unpack() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        sample_tree(&src);

        let tar_path = temp.path().join("base.tar");
        let count = pack_directory(&src, &tar_path).unwrap();
        assert_eq!(count, 5);

        let out = temp.path().join("out");
        unpack(File::open(&tar_path).unwrap(), &out).unwrap();
        assert_eq!(fs::read(out.join("PG_VERSION")).unwrap(), b"16\n");
        assert_eq!(fs::read(out.join("base/1/1259")).unwrap(), vec![9u8; 8192]);
        assert!(out.join("pg_wal").is_dir());

        assert_eq!(count_entries(File::open(&tar_path).unwrap()).unwrap(), 5);
    }

    #[test]
    fn test_garbage_is_integrity_failure() {
        let temp = TempDir::new().unwrap();
        let err = unpack(&[0x55u8; 1024][..], &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, VaultError::Integrity(_)));
    }

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
