//! Command sequencing
//!
//! [`Orchestrator`] wires the configured components together for one
//! invocation: it runs the requested pipeline, sweeps the affected class
//! when `sweep_after_run` is set, and appends the outcome to the operation
//! log. Components never call each other through it.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::audit::{OperationEntry, OperationKind, OperationLog};
use crate::backup::{
    ArchiveReport, CaptureRequest, LogArchiver, RetentionSweeper, SnapshotCapture, SweepReport,
};
use crate::codec::ArtifactCodec;
use crate::config::{Settings, VaultPaths};
use crate::engine::SourceEngine;
use crate::error::{VaultError, VaultResult};
use crate::inventory::{Inventory, SourceStatus, StatusReport};
use crate::models::{ArtifactClass, SnapshotArtifact, Trigger, TIMESTAMP_FORMAT};
use crate::offsite::{OffsiteReport, OffsiteTransport, TransferGateway};
use crate::restore::{RestoreResult, RestoreStager, StagedRestore, VerificationReport, Verifier};
use crate::storage::{force_unlock, ArtifactStore, LockHolder};

/// Snapshot taken by `full` or `base`, with the sweep that followed it
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub snapshot: SnapshotArtifact,
    pub sweep: Option<SweepReport>,
}

/// Archive pass run by `wal`, with the sweep that followed it
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub report: ArchiveReport,
    pub sweep: Option<SweepReport>,
}

/// Runs walvault commands against one store
pub struct Orchestrator {
    paths: VaultPaths,
    settings: Settings,
    codec: ArtifactCodec,
    engine: Box<dyn SourceEngine>,
    transport: Option<Box<dyn OffsiteTransport>>,
    log: OperationLog,
}

impl Orchestrator {
    pub fn new(
        paths: VaultPaths,
        settings: Settings,
        codec: ArtifactCodec,
        engine: Box<dyn SourceEngine>,
    ) -> Self {
        let log = OperationLog::new(paths.operation_log());
        Self {
            paths,
            settings,
            codec,
            engine,
            transport: None,
            log,
        }
    }

    /// Use `transport` for `remote`
    pub fn with_transport(mut self, transport: Box<dyn OffsiteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.log
    }

    fn store(&self) -> ArtifactStore {
        ArtifactStore::new(self.paths.clone())
    }

    fn archiver(&self) -> LogArchiver<'_> {
        LogArchiver::new(
            &self.paths,
            &self.settings.source.wal_dir,
            &self.codec,
            self.engine.as_ref(),
        )
    }

    /// Run `f`, then append its outcome to the operation log
    ///
    /// A failure to write the log is logged and otherwise ignored; it never
    /// masks the operation's own result.
    fn recorded<T>(
        &self,
        operation: OperationKind,
        f: impl FnOnce() -> VaultResult<T>,
        describe: impl FnOnce(&T) -> (Option<String>, String),
    ) -> VaultResult<T> {
        let started = Instant::now();
        let result = f();
        let elapsed = started.elapsed().as_millis() as u64;

        let entry = match &result {
            Ok(value) => {
                let (artifact, detail) = describe(value);
                OperationEntry::succeeded(operation, artifact, detail, elapsed)
            }
            Err(e) => OperationEntry::failed(operation, e.to_string(), elapsed),
        };
        if let Err(e) = self.log.record(&entry) {
            warn!(error = %e, "failed to append to the operation log");
        }
        result
    }

    fn sweep_after_run(&self, class: ArtifactClass) -> Option<SweepReport> {
        if !self.settings.sweep_after_run {
            return None;
        }

        match RetentionSweeper::new(&self.paths, &self.settings.retention).sweep(
            class,
            Utc::now(),
            false,
        ) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(class = %class, error = %e, "post-run sweep failed");
                None
            }
        }
    }

    /// Take a full or base snapshot
    pub fn capture(
        &self,
        class: ArtifactClass,
        trigger: Trigger,
        label: Option<String>,
    ) -> VaultResult<CaptureOutcome> {
        let operation = match class {
            ArtifactClass::Base => OperationKind::BaseCapture,
            _ => OperationKind::FullCapture,
        };
        let request = CaptureRequest::new(class)
            .with_trigger(trigger)
            .with_label(label);

        let snapshot = self.recorded(
            operation,
            || {
                SnapshotCapture::new(&self.paths, &self.settings, &self.codec, self.engine.as_ref())
                    .capture(&request)
            },
            |snapshot| {
                (
                    Some(snapshot.id().to_string()),
                    format!(
                        "{} {} bytes ({})",
                        snapshot.metadata.format, snapshot.metadata.size_bytes, snapshot.metadata.chain
                    ),
                )
            },
        )?;

        let sweep = self.sweep_after_run(class);
        Ok(CaptureOutcome { snapshot, sweep })
    }

    /// Archive closed log segments
    pub fn archive(&self) -> VaultResult<ArchiveOutcome> {
        let report = self.recorded(
            OperationKind::Archive,
            || self.archiver().archive(),
            |report| (None, report.summary()),
        )?;

        let sweep = self.sweep_after_run(ArtifactClass::Wal);
        Ok(ArchiveOutcome { report, sweep })
    }

    /// Force the engine to close its segment, then archive
    pub fn switch(&self) -> VaultResult<ArchiveReport> {
        self.recorded(
            OperationKind::Switch,
            || self.archiver().force_cut(),
            |report| (None, report.summary()),
        )
    }

    /// Package the newest base snapshot with all segments and send it offsite
    pub fn offsite(&self) -> VaultResult<OffsiteReport> {
        self.recorded(
            OperationKind::Offsite,
            || {
                if !self.settings.offsite.enabled {
                    return Err(VaultError::Config(
                        "offsite transfer is disabled (set offsite.enabled)".into(),
                    ));
                }
                let transport = self.transport.as_deref().ok_or_else(|| {
                    VaultError::Config("no offsite transport configured".into())
                })?;
                let archiver = self.archiver();
                TransferGateway::new(&self.paths, &archiver, transport).run()
            },
            |report| {
                (
                    report
                        .package
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string()),
                    format!("sent to {}", report.remote),
                )
            },
        )
    }

    /// Decode a snapshot straight into a data directory
    ///
    /// Without `target`, restores into the configured `source.data_dir`.
    /// When `snapshot_first` is set and a forced restore is about to replace
    /// the engine's own data directory, a full snapshot of the running engine
    /// is taken first.
    pub fn restore(
        &self,
        reference: &str,
        target: Option<PathBuf>,
        force: bool,
        snapshot_first: bool,
    ) -> VaultResult<RestoreResult> {
        let target = target.unwrap_or_else(|| self.settings.source.data_dir.clone());
        self.recorded(
            OperationKind::Restore,
            || {
                // Resolve before the pre-restore snapshot can become "latest"
                let snapshot = self.store().resolve_snapshot(reference)?;

                let replaces_engine_data = force
                    && target == self.settings.source.data_dir
                    && target.exists()
                    && fs::read_dir(&target)?.next().is_some();
                let pre_restore = if snapshot_first && replaces_engine_data {
                    Some(self.pre_restore_snapshot(&snapshot)?)
                } else {
                    None
                };

                let mut result = RestoreStager::new(&self.paths, &self.codec)
                    .restore_into(&snapshot, &target, force)?;
                result.pre_restore_snapshot = pre_restore;
                Ok(result)
            },
            |result| {
                let mut detail = format!("into {}", result.target.display());
                if let Some(id) = &result.pre_restore_snapshot {
                    detail.push_str(&format!(" after pre-restore snapshot {}", id));
                }
                (Some(result.snapshot.clone()), detail)
            },
        )
    }

    /// Capture the engine's current state before it is overwritten
    ///
    /// No sweep follows, so the snapshot being restored cannot expire
    /// underneath the restore.
    fn pre_restore_snapshot(&self, replacing: &SnapshotArtifact) -> VaultResult<String> {
        info!(restoring = %replacing.id(), "taking pre-restore snapshot");
        let request = CaptureRequest::new(ArtifactClass::Full)
            .with_trigger(Trigger::PreRestore)
            .with_label(Some(format!("before restoring {}", replacing.id())));

        let snapshot = SnapshotCapture::new(&self.paths, &self.settings, &self.codec, self.engine.as_ref())
            .capture(&request)
            .map_err(|e| e.with_note("pass --no-snapshot to restore without a pre-restore snapshot"))?;
        Ok(snapshot.id().to_string())
    }

    /// Stage a snapshot and every segment for recovery to the latest point
    pub fn prepare(&self, reference: Option<&str>, into: Option<PathBuf>) -> VaultResult<StagedRestore> {
        let root = into.unwrap_or_else(|| self.default_staging_root());
        self.recorded(
            OperationKind::Prepare,
            || {
                let snapshot = self.store().resolve_snapshot(reference.unwrap_or("latest"))?;
                RestoreStager::new(&self.paths, &self.codec).stage(&snapshot, None, &root)
            },
            |staged| {
                (
                    Some(staged.descriptor.base_snapshot.clone()),
                    format!("staged at {}", staged.root.display()),
                )
            },
        )
    }

    /// Stage for recovery up to `target_time`
    ///
    /// Without an explicit snapshot, the newest snapshot taken at or before
    /// the target is used.
    pub fn pitr(
        &self,
        target_time: DateTime<Utc>,
        reference: Option<&str>,
        into: Option<PathBuf>,
    ) -> VaultResult<StagedRestore> {
        let root = into.unwrap_or_else(|| self.default_staging_root());
        self.recorded(
            OperationKind::Pitr,
            || {
                let snapshot = match reference {
                    Some(reference) => self.store().resolve_snapshot(reference)?,
                    None => self.snapshot_before(target_time)?,
                };
                RestoreStager::new(&self.paths, &self.codec).stage(&snapshot, Some(target_time), &root)
            },
            |staged| {
                (
                    Some(staged.descriptor.base_snapshot.clone()),
                    format!(
                        "target {} staged at {}",
                        target_time.to_rfc3339(),
                        staged.root.display()
                    ),
                )
            },
        )
    }

    /// Newest full or base snapshot created at or before `target_time`
    pub fn snapshot_before(&self, target_time: DateTime<Utc>) -> VaultResult<SnapshotArtifact> {
        let store = self.store();
        let mut candidates = store.list_snapshots(ArtifactClass::Full)?;
        candidates.extend(store.list_snapshots(ArtifactClass::Base)?);

        candidates
            .into_iter()
            .filter(|s| s.created_at() <= target_time)
            .max_by_key(|s| s.created_at())
            .ok_or_else(|| {
                VaultError::snapshot_not_found(format!(
                    "taken at or before {}",
                    target_time.to_rfc3339()
                ))
            })
    }

    fn default_staging_root(&self) -> PathBuf {
        self.paths
            .staging_dir()
            .join(format!("restore_{}", Utc::now().format(TIMESTAMP_FORMAT)))
    }

    /// Check one artifact; a failed check is an integrity error
    pub fn verify(&self, reference: &str) -> VaultResult<VerificationReport> {
        self.recorded(
            OperationKind::Verify,
            || {
                let path = self.store().resolve_artifact(reference)?;
                let report = Verifier::new(&self.codec).verify(&path)?;
                if report.passed {
                    Ok(report)
                } else {
                    Err(VaultError::Integrity(format!(
                        "{}: {}",
                        path.display(),
                        report.problems.join("; ")
                    )))
                }
            },
            |report| (Some(report.artifact.display().to_string()), report.summary()),
        )
    }

    /// Apply retention to one class or to all of them
    pub fn sweep(&self, class: Option<ArtifactClass>, dry_run: bool) -> VaultResult<Vec<SweepReport>> {
        let sweeper = RetentionSweeper::new(&self.paths, &self.settings.retention);
        let now = Utc::now();
        self.recorded(
            OperationKind::Sweep,
            || match class {
                Some(class) => Ok(vec![sweeper.sweep(class, now, dry_run)?]),
                None => sweeper.sweep_all(now, dry_run),
            },
            |reports| {
                let detail = reports
                    .iter()
                    .map(|r| r.summary())
                    .collect::<Vec<_>>()
                    .join("; ");
                (None, detail)
            },
        )
    }

    /// Remove a lock left behind by a killed run
    pub fn unlock(&self, class: ArtifactClass) -> VaultResult<Option<LockHolder>> {
        self.recorded(
            OperationKind::Unlock,
            || force_unlock(&self.paths, class),
            |holder| {
                let detail = match holder {
                    Some(holder) => format!("removed {} lock held by pid {}", class, holder.pid),
                    None => format!("no {} lock was held", class),
                };
                (None, detail)
            },
        )
    }

    /// Enumerate stored artifacts
    pub fn inventory(&self, class: Option<ArtifactClass>) -> VaultResult<Inventory> {
        Inventory::collect(&self.store(), class)
    }

    /// Store health and source connectivity
    pub fn status(&self) -> VaultResult<StatusReport> {
        let source = SourceStatus::probe(self.engine.as_ref());
        info!(source = %source.target, reachable = source.reachable, "probed source");
        StatusReport::collect(&self.paths, source, &self.log)
    }
}
