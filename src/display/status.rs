//! Status report rendering

use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{format_size, format_timestamp};
use crate::inventory::StatusReport;

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Newest")]
    newest: String,
    #[tabled(rename = "Oldest")]
    oldest: String,
    #[tabled(rename = "Incomplete")]
    partials: usize,
}

/// Render `status` output
pub fn format_status(report: &StatusReport, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    out.push_str(&format!("Store:  {}\n", report.home));
    if report.source.reachable {
        out.push_str(&format!(
            "Source: {} (reachable, version {})\n",
            report.source.target,
            report.source.version.as_deref().unwrap_or("unknown")
        ));
    } else {
        out.push_str(&format!(
            "Source: {} (UNREACHABLE: {})\n",
            report.source.target,
            report.source.error.as_deref().unwrap_or("no answer")
        ));
    }
    out.push_str(&format!("Health: {}\n", report.health));
    for reason in &report.reasons {
        out.push_str(&format!("  - {}\n", reason));
    }
    out.push('\n');

    let rows: Vec<ClassRow> = report
        .classes
        .iter()
        .map(|c| ClassRow {
            class: c.class.to_string(),
            count: c.count,
            size: format_size(c.size_bytes),
            newest: c.newest.map(|t| format_timestamp(t, now)).unwrap_or_else(|| "-".into()),
            oldest: c.oldest.map(|t| format_timestamp(t, now)).unwrap_or_else(|| "-".into()),
            partials: c.partials,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    out.push_str(&table.to_string());
    out.push('\n');

    if !report.locks.is_empty() {
        out.push_str("\nHeld locks:\n");
        for (class, holder) in &report.locks {
            match holder {
                Some(holder) => out.push_str(&format!(
                    "  {}: pid {} running {} since {}\n",
                    class,
                    holder.pid,
                    holder.operation,
                    holder.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
                )),
                None => out.push_str(&format!("  {}: unreadable lock file\n", class)),
            }
        }
    }

    if !report.recent.is_empty() {
        out.push_str("\nRecent operations:\n");
        for entry in &report.recent {
            out.push_str(&format!("  {}\n", entry.format_human_readable()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{ClassStatus, Health, SourceStatus};
    use crate::models::ArtifactClass;

    #[test]
    fn test_unreachable_source_rendered() {
        let report = StatusReport {
            home: "/var/lib/walvault".into(),
            source: SourceStatus {
                target: "postgres@db:5432/app".into(),
                reachable: false,
                version: None,
                error: Some("connection refused".into()),
            },
            classes: vec![ClassStatus {
                class: ArtifactClass::Full,
                count: 0,
                size_bytes: 0,
                newest: None,
                oldest: None,
                partials: 0,
            }],
            locks: Vec::new(),
            recent: Vec::new(),
            health: Health::Unhealthy,
            reasons: vec!["source unreachable".into()],
        };

        let text = format_status(&report, Utc::now());
        assert!(text.contains("UNREACHABLE: connection refused"));
        assert!(text.contains("Health: unhealthy"));
        assert!(text.contains("full"));
        assert!(!text.contains("Held locks"));
    }
}
