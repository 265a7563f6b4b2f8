//! Display formatting for terminal output
//!
//! Renders inventory and status reports as tables, plus the small
//! human-readable formatters shared by the command handlers.

pub mod inventory;
pub mod status;

pub use inventory::format_inventory;
pub use status::format_status;

use chrono::{DateTime, Duration, Utc};

/// Format a duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a size in bytes in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// `2026-10-16 02:00:00 (3h ago)`
pub fn format_timestamp(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{} ({} ago)",
        at.format("%Y-%m-%d %H:%M:%S"),
        format_duration(now.signed_duration_since(at))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(16 * 1024 * 1024), "16.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::minutes(90)), "1h");
        assert_eq!(format_duration(Duration::days(10)), "10d");
        assert_eq!(format_duration(Duration::days(65)), "2mo");
        assert_eq!(format_duration(Duration::seconds(-5)), "0s");
    }
}
