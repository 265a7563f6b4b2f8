//! Offsite transports

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::config::settings::OffsiteSettings;
use crate::error::{VaultError, VaultResult};

/// Moves a finished package to offsite storage
pub trait OffsiteTransport {
    /// Human-readable destination, used in logs and the operation log
    fn destination(&self) -> String;

    /// Send the file at `package`, returning where it ended up
    fn send(&self, package: &Path) -> VaultResult<String>;
}

/// Copies packages with `scp` in batch mode
#[derive(Debug, Clone)]
pub struct ScpTransport {
    host: String,
    user: String,
    path: String,
    port: u16,
    key_file: Option<PathBuf>,
}

impl ScpTransport {
    pub fn new(settings: &OffsiteSettings) -> VaultResult<Self> {
        if settings.host.trim().is_empty() || settings.user.trim().is_empty() {
            return Err(VaultError::Config(
                "offsite.host and offsite.user must be set to send packages".into(),
            ));
        }

        Ok(Self {
            host: settings.host.clone(),
            user: settings.user.clone(),
            path: settings.path.clone(),
            port: settings.port,
            key_file: settings.key_file.clone(),
        })
    }

    /// `user@host:path/`
    fn remote_target(&self) -> String {
        let path = self.path.trim_end_matches('/');
        format!("{}@{}:{}/", self.user, self.host, path)
    }

    fn args(&self, package: &Path) -> Vec<String> {
        let mut args = vec!["-B".to_string(), "-P".to_string(), self.port.to_string()];
        if let Some(key) = &self.key_file {
            args.push("-i".into());
            args.push(key.display().to_string());
        }
        args.push(package.display().to_string());
        args.push(self.remote_target());
        args
    }
}

impl OffsiteTransport for ScpTransport {
    fn destination(&self) -> String {
        self.remote_target()
    }

    fn send(&self, package: &Path) -> VaultResult<String> {
        let args = self.args(package);
        debug!(?args, "running scp");

        let output = Command::new("scp")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    VaultError::Config("scp not found; install an OpenSSH client".into())
                } else {
                    VaultError::Transfer(format!("Failed to run scp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VaultError::Transfer(format!(
                "scp of {} to {} failed ({}): {}",
                package.display(),
                self.remote_target(),
                output.status,
                stderr
            )));
        }

        let name = package
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let remote = format!("{}{}", self.remote_target(), name);
        info!(package = %package.display(), remote = %remote, "package transferred");
        Ok(remote)
    }
}
