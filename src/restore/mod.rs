//! Restore side of walvault
//!
//! - `RestoreStager`: rebuilds a data directory from a snapshot and every
//!   archived segment, for recovery to the latest point or to a target time
//! - `RecoveryDescriptor`: directives handed to the engine's own recovery
//! - `Verifier`: read-only integrity check of a single artifact
//!
//! # Example
//!
//! ```rust,ignore
//! use walvault::restore::RestoreStager;
//!
//! let snapshot = store.resolve_snapshot("latest")?;
//! let staged = RestoreStager::new(&paths, &codec).stage(&snapshot, Some(target), &root)?;
//! println!("{}", staged.summary());
//! ```

mod descriptor;
mod stager;
mod verify;

pub use descriptor::{
    RecoveryAction, RecoveryDescriptor, AUTO_CONF_FILE, DESCRIPTOR_FILE, SIGNAL_FILE,
};
pub use stager::{RestoreResult, RestoreStager, StagedRestore, REPLAY_DIR, STAGED_DATA_DIR};
pub use verify::{VerificationReport, VerifiedKind, Verifier};
