//! Settings for walvault
//!
//! Every option has a documented default. Settings are loaded and validated
//! once at startup, then handed to components by reference; nothing reads
//! configuration from process-wide state afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::codec::EncodingChain;
use crate::crypto::{SecureString, MAX_MEMORY_KIB, MAX_PARALLELISM, MAX_TIME_COST};
use crate::error::VaultError;
use crate::models::{ArtifactClass, SnapshotFormat};

/// Connection target and on-disk locations of the source engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    /// The engine's data directory (target of a direct restore)
    pub data_dir: PathBuf,
    /// The engine's live log directory scanned by the archiver
    pub wal_dir: PathBuf,
    /// Directory holding the client binaries; `PATH` lookup when unset
    pub bin_dir: Option<PathBuf>,
    /// Connection attempts before giving up with a connectivity error
    pub connect_attempts: u32,
    /// Delay between connection attempts
    pub connect_retry_delay_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            database: "postgres".to_string(),
            data_dir: PathBuf::from("/var/lib/postgresql/data"),
            wal_dir: PathBuf::from("/var/lib/postgresql/data/pg_wal"),
            bin_dir: None,
            connect_attempts: 3,
            connect_retry_delay_secs: 2,
        }
    }
}

/// Retention windows, in days, per retention class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Full snapshots
    pub full_days: u32,
    /// Base snapshots and archived log segments
    pub incremental_days: u32,
    /// Offsite packages
    pub offsite_days: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            full_days: 30,
            incremental_days: 7,
            offsite_days: 90,
        }
    }
}

impl RetentionSettings {
    /// Window that applies to an artifact class
    pub fn window_days(&self, class: ArtifactClass) -> u32 {
        match class {
            ArtifactClass::Full => self.full_days,
            ArtifactClass::Base | ArtifactClass::Wal => self.incremental_days,
            ArtifactClass::Offsite => self.offsite_days,
        }
    }
}

/// Supported cipher algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CipherAlgorithm {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

/// Argon2id cost parameters used when deriving per-artifact keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfSettings {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iterations
    pub iterations: u32,
    /// Parallelism degree
    pub parallelism: u32,
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Codec selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    pub compress: bool,
    /// Gzip level, 0-9
    pub compression_level: u32,
    pub encrypt: bool,
    pub algorithm: CipherAlgorithm,
    /// Environment variable holding the encryption password
    pub password_env: String,
    /// File holding the encryption password (takes precedence over the env var)
    pub password_file: Option<PathBuf>,
    pub kdf: KdfSettings,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            compress: true,
            compression_level: 6,
            encrypt: false,
            algorithm: CipherAlgorithm::default(),
            password_env: "WALVAULT_PASSWORD".to_string(),
            password_file: None,
            kdf: KdfSettings::default(),
        }
    }
}

impl CodecSettings {
    /// Chain applied to newly encoded artifacts
    pub fn chain(&self) -> EncodingChain {
        EncodingChain::from_flags(self.compress, self.encrypt)
    }

    /// Read the password from the configured file or environment variable
    ///
    /// Returns `None` when neither source yields a value.
    pub fn resolve_password(&self) -> Result<Option<SecureString>, VaultError> {
        if let Some(file) = &self.password_file {
            let contents = std::fs::read_to_string(file).map_err(|e| {
                VaultError::Config(format!(
                    "Failed to read password file {}: {}",
                    file.display(),
                    e
                ))
            })?;
            let password = contents.trim_end_matches(['\r', '\n']);
            if password.is_empty() {
                return Err(VaultError::Config(format!(
                    "Password file {} is empty",
                    file.display()
                )));
            }
            return Ok(Some(SecureString::from(password)));
        }

        match std::env::var(&self.password_env) {
            Ok(value) if !value.is_empty() => Ok(Some(SecureString::from(value))),
            _ => Ok(None),
        }
    }
}

/// Offsite transfer target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsiteSettings {
    pub enabled: bool,
    pub host: String,
    pub user: String,
    /// Remote directory receiving packages
    pub path: String,
    pub port: u16,
    /// SSH identity file
    pub key_file: Option<PathBuf>,
}

impl Default for OffsiteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            user: String::new(),
            path: String::new(),
            port: 22,
            key_file: None,
        }
    }
}

/// Settings for walvault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub codec: CodecSettings,

    #[serde(default)]
    pub offsite: OffsiteSettings,

    /// How snapshots are stored
    #[serde(default)]
    pub snapshot_format: SnapshotFormat,

    /// Sweep the affected class after each capture or archive run
    #[serde(default = "default_sweep_after_run")]
    pub sweep_after_run: bool,
}

fn default_schema_version() -> u32 {
    1
}

fn default_sweep_after_run() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            source: SourceSettings::default(),
            retention: RetentionSettings::default(),
            codec: CodecSettings::default(),
            offsite: OffsiteSettings::default(),
            snapshot_format: SnapshotFormat::default(),
            sweep_after_run: default_sweep_after_run(),
        }
    }
}

impl Settings {
    /// Load settings from a file, or the defaults if it doesn't exist
    pub fn load_or_default(path: &std::path::Path) -> Result<Self, VaultError> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            VaultError::Io(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            VaultError::Config(format!(
                "Failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Save settings to the store's config file
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;
        crate::storage::write_json_atomic(paths.settings_file(), self)
    }

    /// Check option combinations that can never work
    pub fn validate(&self) -> Result<(), VaultError> {
        for class in [ArtifactClass::Full, ArtifactClass::Wal, ArtifactClass::Offsite] {
            if self.retention.window_days(class) == 0 {
                return Err(VaultError::Config(format!(
                    "retention window for {} must be at least one day",
                    class
                )));
            }
        }

        if self.codec.compression_level > 9 {
            return Err(VaultError::Config(format!(
                "codec.compression_level must be 0-9, got {}",
                self.codec.compression_level
            )));
        }

        if self.codec.encrypt
            && self.codec.password_file.is_none()
            && self.codec.password_env.trim().is_empty()
        {
            return Err(VaultError::Config(
                "codec.encrypt requires codec.password_file or codec.password_env".into(),
            ));
        }

        if self.codec.kdf.memory_kib < 8 * self.codec.kdf.parallelism.max(1)
            || self.codec.kdf.iterations == 0
            || self.codec.kdf.parallelism == 0
        {
            return Err(VaultError::Config(
                "codec.kdf needs iterations >= 1, parallelism >= 1 and memory_kib >= 8 * parallelism"
                    .into(),
            ));
        }

        if self.codec.kdf.memory_kib > MAX_MEMORY_KIB
            || self.codec.kdf.iterations > MAX_TIME_COST
            || self.codec.kdf.parallelism > MAX_PARALLELISM
        {
            return Err(VaultError::Config(format!(
                "codec.kdf allows at most memory_kib {}, iterations {} and parallelism {}",
                MAX_MEMORY_KIB, MAX_TIME_COST, MAX_PARALLELISM
            )));
        }

        if self.snapshot_format == SnapshotFormat::Streamed
            && self.codec.chain() != EncodingChain::Plain
        {
            return Err(VaultError::Config(
                "snapshot_format \"streamed\" stores a plain directory; disable codec.compress and codec.encrypt or use \"packaged\"".into(),
            ));
        }

        if self.source.connect_attempts == 0 {
            return Err(VaultError::Config(
                "source.connect_attempts must be at least 1".into(),
            ));
        }

        if self.offsite.enabled
            && (self.offsite.host.is_empty()
                || self.offsite.user.is_empty()
                || self.offsite.path.is_empty())
        {
            return Err(VaultError::Config(
                "offsite.enabled requires offsite.host, offsite.user and offsite.path".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.retention.full_days, 30);
        assert_eq!(settings.retention.incremental_days, 7);
        assert_eq!(settings.retention.offsite_days, 90);
        assert!(settings.codec.compress);
        assert!(!settings.codec.encrypt);
        assert_eq!(settings.codec.chain(), EncodingChain::Compressed);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_window_per_class() {
        let retention = RetentionSettings::default();
        assert_eq!(retention.window_days(ArtifactClass::Full), 30);
        assert_eq!(retention.window_days(ArtifactClass::Base), 7);
        assert_eq!(retention.window_days(ArtifactClass::Wal), 7);
        assert_eq!(retention.window_days(ArtifactClass::Offsite), 90);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.retention.full_days = 14;
        settings.codec.encrypt = true;
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_default(&paths.settings_file()).unwrap();
        assert_eq!(loaded.retention.full_days, 14);
        assert!(loaded.codec.encrypt);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"retention": {"full_days": 3}}"#).unwrap();

        let loaded = Settings::load_or_default(&path).unwrap();
        assert_eq!(loaded.retention.full_days, 3);
        assert_eq!(loaded.retention.incremental_days, 7);
        assert_eq!(loaded.source.port, 5432);
        assert!(loaded.sweep_after_run);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let err = Settings::load_or_default(&path).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[test]
    fn test_streamed_format_rejects_encoding() {
        let mut settings = Settings::default();
        settings.snapshot_format = SnapshotFormat::Streamed;
        assert!(matches!(settings.validate(), Err(VaultError::Config(_))));

        settings.codec.compress = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_kdf_costs_are_capped() {
        let mut settings = Settings::default();
        settings.codec.kdf.iterations = MAX_TIME_COST + 1;
        assert!(matches!(settings.validate(), Err(VaultError::Config(_))));

        settings.codec.kdf.iterations = MAX_TIME_COST;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_offsite_requires_target() {
        let mut settings = Settings::default();
        settings.offsite.enabled = true;
        assert!(settings.validate().is_err());

        settings.offsite.host = "vault.example.net".into();
        settings.offsite.user = "backup".into();
        settings.offsite.path = "/srv/backups".into();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_password_file_takes_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("password");
        std::fs::write(&file, "from-file\n").unwrap();

        let codec = CodecSettings {
            encrypt: true,
            password_file: Some(file),
            password_env: "WALVAULT_TEST_UNSET_PASSWORD_VAR".into(),
            ..Default::default()
        };

        let password = codec.resolve_password().unwrap().unwrap();
        assert_eq!(password.as_str(), "from-file");
    }

    #[test]
    fn test_missing_password_resolves_to_none() {
        let codec = CodecSettings {
            password_env: "WALVAULT_TEST_NEVER_SET_PASSWORD_VAR".into(),
            ..Default::default()
        };
        assert!(codec.resolve_password().unwrap().is_none());
    }
}
