//! Storage layer for walvault
//!
//! Atomic file writes, per-class locks, tar packaging and the read-side
//! inventory of the artifact store.

pub mod file_io;
pub mod lock;
pub mod store;
pub mod tarball;

pub use file_io::{read_json_required, write_bytes_atomic, write_json_atomic};
pub use lock::{force_unlock, held_locks, ClassLock, LockHolder};
pub use store::{disk_usage, modified_at, ArtifactStore, OffsitePackage};
