//! Log segment model
//!
//! Segments keep the names the engine gave them. WAL segment names are 24
//! upper-case hex digits (timeline, log id, segment number) so lexical order
//! is sequence order. Timeline history files (`<8 hex>.history`) are archived
//! alongside them.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use crate::codec::EncodingChain;

const SEGMENT_NAME_LEN: usize = 24;
const TIMELINE_LEN: usize = 8;
const HISTORY_SUFFIX: &str = ".history";

fn is_upper_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// Check for a WAL segment name
pub fn is_wal_segment_name(name: &str) -> bool {
    name.len() == SEGMENT_NAME_LEN && is_upper_hex(name)
}

/// Check for a timeline history file name
pub fn is_history_name(name: &str) -> bool {
    name.strip_suffix(HISTORY_SUFFIX)
        .map(|tli| tli.len() == TIMELINE_LEN && is_upper_hex(tli))
        .unwrap_or(false)
}

/// Check whether a source file is something the archiver copies
pub fn is_archivable_name(name: &str) -> bool {
    is_wal_segment_name(name) || is_history_name(name)
}

/// Parse a textual log position such as `16/B374D848`
pub fn parse_lsn(text: &str) -> Option<u64> {
    let (high, low) = text.trim().split_once('/')?;
    let high = u32::from_str_radix(high, 16).ok()?;
    let low = u32::from_str_radix(low, 16).ok()?;
    Some(((high as u64) << 32) | low as u64)
}

/// Name of the segment holding `lsn` on `timeline`
///
/// `segment_size` must be a power of two no larger than 1 GiB.
pub fn segment_name_for(timeline: u32, lsn: u64, segment_size: u64) -> Option<String> {
    if !segment_size.is_power_of_two() || segment_size > 1 << 30 {
        return None;
    }
    let per_log_id = 0x1_0000_0000 / segment_size;
    let segment = lsn / segment_size;
    Some(format!(
        "{:08X}{:08X}{:08X}",
        timeline,
        segment / per_log_id,
        segment % per_log_id
    ))
}

/// A segment stored in the archive
#[derive(Debug, Clone)]
pub struct ArchivedSegment {
    /// Engine-assigned name, without the chain suffix
    pub name: String,
    pub path: PathBuf,
    pub chain: EncodingChain,
    pub size_bytes: u64,
    /// Time the archived copy was written
    pub archived_at: DateTime<Utc>,
}

impl ArchivedSegment {
    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.archived_at)
    }
}
