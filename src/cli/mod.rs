//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the orchestrator.

pub mod backup;
pub mod restore;
pub mod store;

use std::path::PathBuf;

use clap::Subcommand;

use crate::error::VaultResult;
use crate::models::ArtifactClass;
use crate::orchestrator::Orchestrator;

pub use backup::{handle_archive, handle_capture, handle_remote, handle_switch};
pub use restore::{handle_pitr, handle_prepare, handle_restore, handle_verify, parse_target_time};
pub use store::{handle_list, handle_status, handle_sweep, handle_unlock};

/// walvault commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Take a full snapshot
    Full {
        /// Free-form label stored with the snapshot
        #[arg(short, long)]
        label: Option<String>,
        /// Mark the snapshot as taken by hand rather than on schedule
        #[arg(long)]
        on_demand: bool,
    },

    /// Take a base snapshot for incremental recovery
    Base {
        /// Free-form label stored with the snapshot
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Archive closed log segments
    #[command(alias = "sync")]
    Wal,

    /// Force the engine to close its current segment, then archive
    Switch,

    /// Package the latest base snapshot with all segments and send it offsite
    Remote,

    /// List stored artifacts
    List {
        /// Only this class (full, base, wal, offsite)
        #[arg(short, long)]
        class: Option<ArtifactClass>,
    },

    /// Show store health and source connectivity
    Status,

    /// Decode a snapshot straight into a data directory
    Restore {
        /// Snapshot id, path, or 'latest'
        snapshot: String,
        /// Data directory to restore into (defaults to source.data_dir)
        #[arg(short, long)]
        target_dir: Option<PathBuf>,
        /// Move a non-empty target directory aside instead of refusing
        #[arg(short, long)]
        force: bool,
        /// Skip the full snapshot of the running engine taken before a forced
        /// restore over its data directory
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Stage a snapshot and all segments for recovery to the latest point
    Prepare {
        /// Snapshot id, path, or 'latest' (default)
        snapshot: Option<String>,
        /// Staging directory (defaults to a new directory under staging/)
        #[arg(long)]
        into: Option<PathBuf>,
    },

    /// Stage for point-in-time recovery
    Pitr {
        /// Recovery target: RFC 3339 or 'YYYY-MM-DD HH:MM:SS' (UTC)
        target_time: String,
        /// Snapshot to start from (defaults to the newest one before the target)
        #[arg(short, long)]
        snapshot: Option<String>,
        /// Staging directory (defaults to a new directory under staging/)
        #[arg(long)]
        into: Option<PathBuf>,
    },

    /// Check the integrity of a stored artifact
    Verify {
        /// Snapshot id, segment name, package name, or path
        artifact: String,
    },

    /// Delete artifacts older than their retention window
    Sweep {
        /// Only this class (full, base, wal, offsite)
        #[arg(short, long)]
        class: Option<ArtifactClass>,
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a lock left behind by a killed run
    Unlock {
        /// Class to unlock (full, base, wal, offsite)
        class: ArtifactClass,
    },

    /// Initialize the store and write default settings
    Init,

    /// Show current configuration and paths
    Config,
}

impl Commands {
    /// Whether the command encodes or decodes artifacts
    pub fn needs_codec(&self) -> bool {
        matches!(
            self,
            Commands::Full { .. }
                | Commands::Base { .. }
                | Commands::Wal
                | Commands::Switch
                | Commands::Remote
                | Commands::Restore { .. }
                | Commands::Prepare { .. }
                | Commands::Pitr { .. }
                | Commands::Verify { .. }
        )
    }
}

/// Dispatch a store command
///
/// `init` and `config` run before an orchestrator exists and are handled by
/// the binary.
pub fn handle_command(orchestrator: &Orchestrator, cmd: Commands) -> VaultResult<()> {
    match cmd {
        Commands::Full { label, on_demand } => {
            handle_capture(orchestrator, ArtifactClass::Full, label, on_demand)
        }
        Commands::Base { label } => handle_capture(orchestrator, ArtifactClass::Base, label, false),
        Commands::Wal => handle_archive(orchestrator),
        Commands::Switch => handle_switch(orchestrator),
        Commands::Remote => handle_remote(orchestrator),
        Commands::List { class } => handle_list(orchestrator, class),
        Commands::Status => handle_status(orchestrator),
        Commands::Restore {
            snapshot,
            target_dir,
            force,
            no_snapshot,
        } => handle_restore(orchestrator, &snapshot, target_dir, force, !no_snapshot),
        Commands::Prepare { snapshot, into } => {
            handle_prepare(orchestrator, snapshot.as_deref(), into)
        }
        Commands::Pitr {
            target_time,
            snapshot,
            into,
        } => handle_pitr(orchestrator, &target_time, snapshot.as_deref(), into),
        Commands::Verify { artifact } => handle_verify(orchestrator, &artifact),
        Commands::Sweep { class, dry_run } => handle_sweep(orchestrator, class, dry_run),
        Commands::Unlock { class } => handle_unlock(orchestrator, class),
        Commands::Init | Commands::Config => Ok(()),
    }
}
