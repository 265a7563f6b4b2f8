//! Restore, staging and verification commands

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::{VaultError, VaultResult};
use crate::orchestrator::Orchestrator;
use crate::restore::{StagedRestore, STAGED_DATA_DIR};

/// Parse a recovery target given on the command line
///
/// Accepts RFC 3339 (`2026-10-16T03:30:00Z`, `2026-10-16T05:30:00+02:00`)
/// or `YYYY-MM-DD HH:MM:SS[.fff]`, which is taken as UTC.
pub fn parse_target_time(input: &str) -> VaultResult<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(VaultError::Validation(format!(
        "Invalid target time '{}'. Use RFC 3339 or 'YYYY-MM-DD HH:MM:SS' (UTC)",
        input
    )))
}

fn print_staged(staged: &StagedRestore) {
    println!("{}", staged.summary());
    println!();
    println!("Next steps:");
    println!("  1. Stop the engine if it is running");
    println!(
        "  2. Start it on {} (or move that directory into place)",
        staged.root.join(STAGED_DATA_DIR).display()
    );
    println!("  3. The engine replays segments and promotes itself when done");
}

/// Handle `restore`
pub fn handle_restore(
    orchestrator: &Orchestrator,
    snapshot: &str,
    target_dir: Option<PathBuf>,
    force: bool,
    snapshot_first: bool,
) -> VaultResult<()> {
    let result = orchestrator.restore(snapshot, target_dir, force, snapshot_first)?;
    println!("{}", result.summary());
    Ok(())
}

/// Handle `prepare`
pub fn handle_prepare(
    orchestrator: &Orchestrator,
    snapshot: Option<&str>,
    into: Option<PathBuf>,
) -> VaultResult<()> {
    let staged = orchestrator.prepare(snapshot, into)?;
    print_staged(&staged);
    Ok(())
}

/// Handle `pitr`
pub fn handle_pitr(
    orchestrator: &Orchestrator,
    target_time: &str,
    snapshot: Option<&str>,
    into: Option<PathBuf>,
) -> VaultResult<()> {
    let target = parse_target_time(target_time)?;
    if target > Utc::now() {
        warn!(target = %target, "recovery target is in the future; replay will stop at the last segment");
    }

    let staged = orchestrator.pitr(target, snapshot, into)?;
    print_staged(&staged);
    Ok(())
}

/// Handle `verify`
pub fn handle_verify(orchestrator: &Orchestrator, artifact: &str) -> VaultResult<()> {
    let report = orchestrator.verify(artifact)?;
    println!("{}: {}", report.artifact.display(), report.summary());
    Ok(())
}
