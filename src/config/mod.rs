//! Configuration module for walvault
//!
//! This module provides configuration management including:
//! - Store home and layout resolution
//! - Settings persistence and validation

pub mod paths;
pub mod settings;

pub use paths::VaultPaths;
pub use settings::Settings;
