//! Operation log for walvault
//!
//! Records every command run against the store, with its outcome, in an
//! append-only JSONL file under `logs/`. `walvault status` reads the tail
//! back to show recent activity.
//!
//! # Example
//!
//! ```rust,ignore
//! use walvault::audit::{OperationEntry, OperationKind, OperationLog};
//!
//! let log = OperationLog::new(paths.operation_log());
//! log.record(&OperationEntry::succeeded(
//!     OperationKind::FullCapture,
//!     Some(snapshot.id().to_string()),
//!     "12.4 MB",
//!     elapsed_ms,
//! ))?;
//! ```

mod entry;
mod logger;

pub use entry::{OperationEntry, OperationKind, Outcome};
pub use logger::OperationLog;
