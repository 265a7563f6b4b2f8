//! Backup pipeline for walvault
//!
//! # Architecture
//!
//! - `SnapshotCapture`: full and base snapshots through the engine's native
//!   base-copy mechanism, packaged and encoded into the store
//! - `LogArchiver`: idempotent copy of closed log segments into `wal/`
//! - `RetentionSweeper`: age-based expiry per artifact class
//!
//! Each component takes the class lock for the duration of its work.
//!
//! # Example
//!
//! ```rust,ignore
//! use walvault::backup::{CaptureRequest, RetentionSweeper, SnapshotCapture};
//! use walvault::models::ArtifactClass;
//!
//! let capture = SnapshotCapture::new(&paths, &settings, &codec, &engine);
//! let snapshot = capture.capture(&CaptureRequest::new(ArtifactClass::Full))?;
//!
//! let sweeper = RetentionSweeper::new(&paths, &settings.retention);
//! let report = sweeper.sweep(ArtifactClass::Full, chrono::Utc::now(), false)?;
//! println!("{}", report.summary());
//! ```

mod archiver;
mod capture;
mod retention;

pub use archiver::{ArchiveReport, LogArchiver};
pub use capture::{CaptureRequest, SnapshotCapture};
pub(crate) use capture::discard;
pub use retention::{RetentionSweeper, SweepReport};
