//! walvault - backup and point-in-time recovery orchestration
//!
//! This library captures consistent snapshots of a write-ahead-logged
//! database, archives its closed log segments, and stages restores that the
//! engine's own recovery replays up to a chosen moment. Every artifact can be
//! compressed and encrypted on its way into the store.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Store layout and settings
//! - `error`: Custom error types
//! - `models`: Artifact identities, snapshot metadata, segment names
//! - `codec`: Compression and authenticated encryption of artifacts
//! - `crypto`: Key derivation and AES-GCM primitives
//! - `storage`: Atomic writes, class locks, tar packaging, store inventory
//! - `engine`: The source engine interface and its PostgreSQL adapter
//! - `backup`: Snapshot capture, segment archiving, retention
//! - `restore`: Restore staging, recovery descriptors, verification
//! - `offsite`: Offsite packaging and transport
//! - `audit`: Operation log
//! - `orchestrator`: Sequences a command's pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use walvault::config::{Settings, VaultPaths};
//!
//! let paths = VaultPaths::resolve(None)?;
//! let settings = Settings::load_or_default(&paths.settings_file())?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod display;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod models;
pub mod offsite;
pub mod orchestrator;
pub mod restore;
pub mod storage;

pub use error::{VaultError, VaultResult};
