//! Store inventory and health
//!
//! Read-only views over the store used by `list` and `status`. Nothing here
//! takes a lock; a capture running concurrently only shows up as a partial.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::audit::{OperationEntry, OperationLog};
use crate::config::VaultPaths;
use crate::engine::SourceEngine;
use crate::error::VaultResult;
use crate::models::{ArchivedSegment, ArtifactClass, SnapshotArtifact};
use crate::storage::{disk_usage, held_locks, ArtifactStore, LockHolder, OffsitePackage};

/// Number of operation log entries shown by `status`
pub const RECENT_OPERATIONS: usize = 5;

/// Everything stored, optionally restricted to one class
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub full: Vec<SnapshotArtifact>,
    pub base: Vec<SnapshotArtifact>,
    pub segments: Vec<ArchivedSegment>,
    pub packages: Vec<OffsitePackage>,
}

impl Inventory {
    pub fn collect(store: &ArtifactStore, class: Option<ArtifactClass>) -> VaultResult<Self> {
        let wants = |c: ArtifactClass| class.map_or(true, |only| only == c);

        let mut inventory = Inventory::default();
        if wants(ArtifactClass::Full) {
            inventory.full = store.list_snapshots(ArtifactClass::Full)?;
        }
        if wants(ArtifactClass::Base) {
            inventory.base = store.list_snapshots(ArtifactClass::Base)?;
        }
        if wants(ArtifactClass::Wal) {
            inventory.segments = store.list_segments()?;
        }
        if wants(ArtifactClass::Offsite) {
            inventory.packages = store.list_offsite_packages()?;
        }
        Ok(inventory)
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
            && self.base.is_empty()
            && self.segments.is_empty()
            && self.packages.is_empty()
    }

    /// First and last archived segment names
    pub fn segment_range(&self) -> Option<(&str, &str)> {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => Some((first.name.as_str(), last.name.as_str())),
            _ => None,
        }
    }
}

/// Overall store health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    /// Usable, but an operator should look
    Degraded,
    /// The source cannot be reached
    Unhealthy,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Degraded => write!(f, "degraded"),
            Health::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Per-class counts for `status`
#[derive(Debug, Clone)]
pub struct ClassStatus {
    pub class: ArtifactClass,
    pub count: usize,
    pub size_bytes: u64,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
    /// Leftovers of interrupted runs
    pub partials: usize,
}

/// Source reachability as seen by `status`
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub target: String,
    pub reachable: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

impl SourceStatus {
    /// Single ping, no retries
    pub fn probe(engine: &dyn SourceEngine) -> Self {
        let target = engine.describe();
        match engine.ping().and_then(|_| engine.server_version()) {
            Ok(version) => Self {
                target,
                reachable: true,
                version: Some(version),
                error: None,
            },
            Err(e) => Self {
                target,
                reachable: false,
                version: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Snapshot of store and source health
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub home: String,
    pub source: SourceStatus,
    pub classes: Vec<ClassStatus>,
    pub locks: Vec<(ArtifactClass, Option<LockHolder>)>,
    pub recent: Vec<OperationEntry>,
    pub health: Health,
    /// Why health is not `healthy`
    pub reasons: Vec<String>,
}

impl StatusReport {
    pub fn collect(
        paths: &VaultPaths,
        source: SourceStatus,
        log: &OperationLog,
    ) -> VaultResult<Self> {
        let store = ArtifactStore::new(paths.clone());
        let inventory = Inventory::collect(&store, None)?;

        let mut classes = Vec::new();
        for class in ArtifactClass::ALL {
            let (count, size_bytes, times): (usize, u64, Vec<DateTime<Utc>>) = match class {
                ArtifactClass::Full | ArtifactClass::Base => {
                    let snapshots = if class == ArtifactClass::Full {
                        &inventory.full
                    } else {
                        &inventory.base
                    };
                    (
                        snapshots.len(),
                        snapshots.iter().map(|s| disk_usage(&s.dir)).sum(),
                        snapshots.iter().map(|s| s.created_at()).collect(),
                    )
                }
                ArtifactClass::Wal => (
                    inventory.segments.len(),
                    inventory.segments.iter().map(|s| s.size_bytes).sum(),
                    inventory.segments.iter().map(|s| s.archived_at).collect(),
                ),
                ArtifactClass::Offsite => (
                    inventory.packages.len(),
                    inventory.packages.iter().map(|p| p.size_bytes).sum(),
                    inventory.packages.iter().map(|p| p.created_at).collect(),
                ),
            };

            classes.push(ClassStatus {
                class,
                count,
                size_bytes,
                newest: times.iter().max().copied(),
                oldest: times.iter().min().copied(),
                partials: store.list_partials(class)?.len(),
            });
        }

        let recent = log.read_recent(RECENT_OPERATIONS)?;
        let locks = held_locks(paths);

        let mut reasons = Vec::new();
        if !source.reachable {
            reasons.push(format!(
                "source {} unreachable: {}",
                source.target,
                source.error.as_deref().unwrap_or("no answer")
            ));
        }
        let partials: usize = classes.iter().map(|c| c.partials).sum();
        if partials > 0 {
            reasons.push(format!("{} incomplete artifact(s) in the store", partials));
        }
        if inventory.full.is_empty() && inventory.base.is_empty() {
            reasons.push("no restorable snapshot".to_string());
        }

        let health = if !source.reachable {
            Health::Unhealthy
        } else if reasons.is_empty() {
            Health::Healthy
        } else {
            Health::Degraded
        };

        Ok(Self {
            home: paths.base_dir().display().to_string(),
            source,
            classes,
            locks,
            recent,
            health,
            reasons,
        })
    }
}
