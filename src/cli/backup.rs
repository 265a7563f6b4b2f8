//! Capture and archive commands
//!
//! `full`, `base`, `wal`, `switch` and `remote`.

use crate::backup::SweepReport;
use crate::display::format_size;
use crate::error::VaultResult;
use crate::models::{ArtifactClass, Trigger};
use crate::orchestrator::Orchestrator;

fn print_sweep(sweep: &Option<SweepReport>) {
    if let Some(report) = sweep {
        if !report.deleted.is_empty() || !report.partials_removed.is_empty() {
            println!("Retention: {}", report.summary());
        }
    }
}

/// Handle `full` and `base`
pub fn handle_capture(
    orchestrator: &Orchestrator,
    class: ArtifactClass,
    label: Option<String>,
    on_demand: bool,
) -> VaultResult<()> {
    let trigger = if on_demand {
        Trigger::OnDemand
    } else {
        Trigger::Scheduled
    };

    println!("Capturing {} snapshot...", class);
    let outcome = orchestrator.capture(class, trigger, label)?;
    let metadata = &outcome.snapshot.metadata;

    println!("Snapshot created: {}", metadata.id);
    println!("Location: {}", outcome.snapshot.dir.display());
    println!(
        "Size: {} ({} before encoding, {})",
        format_size(metadata.size_bytes),
        format_size(metadata.raw_size_bytes),
        metadata.chain
    );
    if let Some(checksum) = &metadata.checksum {
        println!("SHA-256: {}", checksum);
    }
    print_sweep(&outcome.sweep);
    Ok(())
}

/// Handle `wal`
pub fn handle_archive(orchestrator: &Orchestrator) -> VaultResult<()> {
    let outcome = orchestrator.archive()?;
    for name in &outcome.report.archived {
        println!("Archived {}", name);
    }
    println!("{}", outcome.report.summary());
    print_sweep(&outcome.sweep);
    Ok(())
}

/// Handle `switch`
pub fn handle_switch(orchestrator: &Orchestrator) -> VaultResult<()> {
    let report = orchestrator.switch()?;
    for name in &report.archived {
        println!("Archived {}", name);
    }
    println!("{}", report.summary());
    Ok(())
}

/// Handle `remote`
pub fn handle_remote(orchestrator: &Orchestrator) -> VaultResult<()> {
    println!("Packaging latest base snapshot for offsite transfer...");
    let report = orchestrator.offsite()?;
    println!("{}", report.summary());
    println!("Local copy: {}", report.package.display());
    Ok(())
}
