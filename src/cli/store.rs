//! Store inspection and maintenance commands
//!
//! `list`, `status`, `sweep` and `unlock`.

use chrono::Utc;

use crate::display::{format_inventory, format_status};
use crate::error::VaultResult;
use crate::models::ArtifactClass;
use crate::orchestrator::Orchestrator;

/// Handle `list`
pub fn handle_list(orchestrator: &Orchestrator, class: Option<ArtifactClass>) -> VaultResult<()> {
    let inventory = orchestrator.inventory(class)?;
    println!("{}", format_inventory(&inventory, Utc::now()));
    Ok(())
}

/// Handle `status`
pub fn handle_status(orchestrator: &Orchestrator) -> VaultResult<()> {
    let report = orchestrator.status()?;
    print!("{}", format_status(&report, Utc::now()));
    Ok(())
}

/// Handle `sweep`
pub fn handle_sweep(
    orchestrator: &Orchestrator,
    class: Option<ArtifactClass>,
    dry_run: bool,
) -> VaultResult<()> {
    let reports = orchestrator.sweep(class, dry_run)?;
    for report in &reports {
        println!("{}", report.summary());
        for path in &report.deleted {
            println!("  {}", path.display());
        }
    }
    if dry_run {
        println!();
        println!("Dry run: nothing was deleted.");
    }
    Ok(())
}

/// Handle `unlock`
pub fn handle_unlock(orchestrator: &Orchestrator, class: ArtifactClass) -> VaultResult<()> {
    match orchestrator.unlock(class)? {
        Some(holder) => println!(
            "Removed {} lock held by pid {} ({} since {})",
            class,
            holder.pid,
            holder.operation,
            holder.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("No {} lock was held.", class),
    }
    Ok(())
}
