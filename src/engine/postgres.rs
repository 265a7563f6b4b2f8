//! PostgreSQL adapter
//!
//! Shells out to `pg_isready`, `psql` and `pg_basebackup`. Authentication is
//! left to libpq's own mechanisms (`PGPASSWORD`, `~/.pgpass`, peer auth);
//! every invocation is non-interactive.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info};

use super::SourceEngine;
use crate::config::settings::SourceSettings;
use crate::error::{VaultError, VaultResult};
use crate::models::{is_wal_segment_name, parse_lsn, segment_name_for};

/// Engine adapter for a PostgreSQL cluster
#[derive(Debug, Clone)]
pub struct PostgresEngine {
    host: String,
    port: u16,
    user: String,
    database: String,
    bin_dir: Option<PathBuf>,
}

impl PostgresEngine {
    pub fn new(source: &SourceSettings) -> Self {
        Self {
            host: source.host.clone(),
            port: source.port,
            user: source.user.clone(),
            database: source.database.clone(),
            bin_dir: source.bin_dir.clone(),
        }
    }

    fn binary(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn connection_args(&self) -> Vec<String> {
        vec![
            "-h".into(),
            self.host.clone(),
            "-p".into(),
            self.port.to_string(),
            "-U".into(),
            self.user.clone(),
        ]
    }

    fn run(&self, name: &str, args: &[String]) -> VaultResult<Output> {
        let binary = self.binary(name);
        debug!(binary = %binary.display(), ?args, "running engine client");

        Command::new(&binary)
            .args(args)
            .env("PGCONNECT_TIMEOUT", "10")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    VaultError::Config(format!(
                        "{} not found; install the PostgreSQL client tools or set source.bin_dir",
                        binary.display()
                    ))
                } else {
                    VaultError::Io(format!("Failed to run {}: {}", binary.display(), e))
                }
            })
    }

    /// Run a single-value query and return its trimmed output
    fn query(&self, sql: &str) -> VaultResult<String> {
        let mut args = self.connection_args();
        args.extend([
            "-d".into(),
            self.database.clone(),
            "-X".into(),
            "-t".into(),
            "-A".into(),
            "-q".into(),
            "-w".into(),
            "-c".into(),
            sql.into(),
        ]);

        let output = self.run("psql", &args)?;
        if !output.status.success() {
            return Err(VaultError::Connectivity(format!(
                "query against {} failed: {}",
                self.describe(),
                stderr_of(&output)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Interpret the row returned by the current-segment query
fn parse_current_segment(row: &str) -> Option<String> {
    if is_wal_segment_name(row) {
        return Some(row.to_string());
    }

    let mut fields = row.strip_prefix("receiving|")?.split('|');
    let timeline = fields.next()?.parse().ok()?;
    let lsn = parse_lsn(fields.next()?)?;
    let segment_size = fields.next()?.parse().ok()?;
    segment_name_for(timeline, lsn, segment_size)
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    }
}

impl SourceEngine for PostgresEngine {
    fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    fn ping(&self) -> VaultResult<()> {
        let mut args = self.connection_args();
        args.extend(["-d".into(), self.database.clone()]);

        let output = self.run("pg_isready", &args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(VaultError::Connectivity(format!(
                "{} is not accepting connections: {}",
                self.describe(),
                String::from_utf8_lossy(&output.stdout).trim()
            )))
        }
    }

    fn check_privileges(&self) -> VaultResult<()> {
        let granted = self.query(
            "SELECT rolreplication OR rolsuper FROM pg_roles WHERE rolname = current_user",
        )?;
        if granted == "t" {
            Ok(())
        } else {
            Err(VaultError::Config(format!(
                "role '{}' lacks the REPLICATION privilege required for base backups",
                self.user
            )))
        }
    }

    fn server_version(&self) -> VaultResult<String> {
        self.query("SHOW server_version")
    }

    fn base_backup(&self, dest: &Path) -> VaultResult<()> {
        let mut args = self.connection_args();
        args.extend([
            "-D".into(),
            dest.to_string_lossy().to_string(),
            "-Fp".into(),
            "-Xs".into(),
            "-c".into(),
            "fast".into(),
            "-w".into(),
        ]);

        info!(target = %self.describe(), dest = %dest.display(), "starting pg_basebackup");
        let output = self.run("pg_basebackup", &args)?;
        if !output.status.success() {
            return Err(VaultError::Capture(format!(
                "pg_basebackup failed: {}",
                stderr_of(&output)
            )));
        }

        if !dest.join("PG_VERSION").is_file() {
            return Err(VaultError::Capture(format!(
                "pg_basebackup exited cleanly but {} has no PG_VERSION",
                dest.display()
            )));
        }

        Ok(())
    }

    /// On a standby the receiver's flush position stands in for the write
    /// position, which `pg_walfile_name` refuses to report during recovery.
    fn current_segment(&self) -> VaultResult<Option<String>> {
        let row = self.query(
            "SELECT CASE WHEN pg_is_in_recovery() THEN \
             coalesce((SELECT 'receiving|' || received_tli || '|' || flushed_lsn || '|' || \
             (SELECT setting FROM pg_settings WHERE name = 'wal_segment_size') \
             FROM pg_stat_wal_receiver), '') \
             ELSE pg_walfile_name(pg_current_wal_lsn()) END",
        )?;
        Ok(parse_current_segment(&row))
    }

    fn switch_segment(&self) -> VaultResult<()> {
        let lsn = self.query("SELECT pg_switch_wal()")?;
        debug!(lsn = %lsn, "forced segment switch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PostgresEngine {
        PostgresEngine::new(&SourceSettings {
            host: "db.internal".into(),
            port: 5433,
            user: "replicator".into(),
            database: "app".into(),
            bin_dir: Some(PathBuf::from("/usr/lib/postgresql/16/bin")),
            ..Default::default()
        })
    }

    #[test]
    fn test_describe() {
        assert_eq!(engine().describe(), "replicator@db.internal:5433/app");
    }

    #[test]
    fn test_binary_uses_bin_dir() {
        assert_eq!(
            engine().binary("psql"),
            PathBuf::from("/usr/lib/postgresql/16/bin/psql")
        );

        let on_path = PostgresEngine::new(&SourceSettings::default());
        assert_eq!(on_path.binary("psql"), PathBuf::from("psql"));
    }

    #[test]
    fn test_current_segment_on_primary_and_standby() {
        assert_eq!(
            parse_current_segment("00000001000000000000002A").as_deref(),
            Some("00000001000000000000002A")
        );
        assert_eq!(
            parse_current_segment("receiving|2|0/5A000148|16777216").as_deref(),
            Some("00000002000000000000005A")
        );
        // Standby without a running receiver
        assert_eq!(parse_current_segment(""), None);
    }

    #[test]
    fn test_missing_binary_is_config_error() {
        let engine = PostgresEngine::new(&SourceSettings {
            bin_dir: Some(PathBuf::from("/nonexistent/walvault/bin")),
            ..Default::default()
        });
        assert!(matches!(engine.ping(), Err(VaultError::Config(_))));
    }
}
