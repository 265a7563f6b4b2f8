//! Inventory tables for `list`

use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{format_duration, format_size};
use crate::inventory::Inventory;
use crate::models::SnapshotArtifact;

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Snapshot")]
    id: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Encoding")]
    chain: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Label")]
    label: String,
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "Package")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Age")]
    age: String,
}

fn snapshot_table(snapshots: &[SnapshotArtifact], now: DateTime<Utc>) -> String {
    let rows: Vec<SnapshotRow> = snapshots
        .iter()
        .map(|s| SnapshotRow {
            id: s.id().to_string(),
            format: s.metadata.format.to_string(),
            chain: s.metadata.chain.to_string(),
            size: format_size(s.metadata.size_bytes),
            age: format_duration(s.age(now)),
            trigger: s.metadata.trigger.to_string(),
            label: s.metadata.label.clone().unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// Render the whole inventory, one section per class
pub fn format_inventory(inventory: &Inventory, now: DateTime<Utc>) -> String {
    if inventory.is_empty() {
        return "No artifacts found.\nTake one with: walvault full".to_string();
    }

    let mut sections = Vec::new();

    for (title, snapshots) in [
        ("Full snapshots", &inventory.full),
        ("Base snapshots", &inventory.base),
    ] {
        if !snapshots.is_empty() {
            sections.push(format!(
                "{} ({})\n{}",
                title,
                snapshots.len(),
                snapshot_table(snapshots, now)
            ));
        }
    }

    if let Some((first, last)) = inventory.segment_range() {
        let total: u64 = inventory.segments.iter().map(|s| s.size_bytes).sum();
        sections.push(format!(
            "Archived segments: {} ({}), {} .. {}",
            inventory.segments.len(),
            format_size(total),
            first,
            last
        ));
    }

    if !inventory.packages.is_empty() {
        let rows: Vec<PackageRow> = inventory
            .packages
            .iter()
            .map(|p| PackageRow {
                name: p.name.clone(),
                size: format_size(p.size_bytes),
                age: format_duration(p.age(now)),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        sections.push(format!(
            "Offsite packages ({})\n{}",
            inventory.packages.len(),
            table
        ));
    }

    sections.join("\n\n")
}
