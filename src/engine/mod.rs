//! Source engine interface
//!
//! Everything walvault needs from the data engine goes through
//! [`SourceEngine`]: reachability, the replication privilege check, the
//! native base-copy mechanism, and log segment control. [`PostgresEngine`]
//! drives PostgreSQL's client binaries; tests substitute their own engine.

mod postgres;

pub use postgres::PostgresEngine;

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::settings::SourceSettings;
use crate::error::{VaultError, VaultResult};

/// Narrow interface to the engine being protected
pub trait SourceEngine {
    /// Human-readable connection target, recorded in snapshot metadata
    fn describe(&self) -> String;

    /// Check that the engine accepts connections
    fn ping(&self) -> VaultResult<()>;

    /// Check that the configured role may take base copies
    fn check_privileges(&self) -> VaultResult<()>;

    /// Engine version string
    fn server_version(&self) -> VaultResult<String>;

    /// Write a consistent copy of the data directory into `dest`
    ///
    /// `dest` exists and is empty when called.
    fn base_backup(&self, dest: &Path) -> VaultResult<()>;

    /// Name of the segment the engine is currently writing, if it reports one
    fn current_segment(&self) -> VaultResult<Option<String>>;

    /// Close the current segment so it becomes archivable
    fn switch_segment(&self) -> VaultResult<()>;
}

/// Ping until the engine answers, up to `source.connect_attempts` times
pub fn wait_until_reachable(engine: &dyn SourceEngine, source: &SourceSettings) -> VaultResult<()> {
    let attempts = source.connect_attempts.max(1);
    let delay = Duration::from_secs(source.connect_retry_delay_secs);

    let mut last_error = None;
    for attempt in 1..=attempts {
        match engine.ping() {
            Ok(()) => {
                debug!(target = %engine.describe(), attempt, "source reachable");
                return Ok(());
            }
            Err(e) => {
                warn!(target = %engine.describe(), attempt, attempts, error = %e, "source not reachable");
                last_error = Some(e);
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }

    Err(VaultError::Connectivity(format!(
        "{} unreachable after {} attempt(s): {}",
        engine.describe(),
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Reachability plus privilege check, run before any capture
pub fn preflight(engine: &dyn SourceEngine, source: &SourceSettings) -> VaultResult<()> {
    wait_until_reachable(engine, source)?;
    engine.check_privileges()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FlakyEngine {
        failures_left: Cell<u32>,
        pings: Cell<u32>,
    }

    impl SourceEngine for FlakyEngine {
        fn describe(&self) -> String {
            "flaky:5432".into()
        }
        fn ping(&self) -> VaultResult<()> {
            self.pings.set(self.pings.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                Err(VaultError::Connectivity("connection refused".into()))
            } else {
                Ok(())
            }
        }
        fn check_privileges(&self) -> VaultResult<()> {
            Ok(())
        }
        fn server_version(&self) -> VaultResult<String> {
            Ok("16.2".into())
        }
        fn base_backup(&self, _dest: &Path) -> VaultResult<()> {
            Ok(())
        }
        fn current_segment(&self) -> VaultResult<Option<String>> {
            Ok(None)
        }
        fn switch_segment(&self) -> VaultResult<()> {
            Ok(())
        }
    }

    fn source(attempts: u32) -> SourceSettings {
        SourceSettings {
            connect_attempts: attempts,
            connect_retry_delay_secs: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_until_reachable() {
        let engine = FlakyEngine {
            failures_left: Cell::new(2),
            pings: Cell::new(0),
        };
        wait_until_reachable(&engine, &source(3)).unwrap();
        assert_eq!(engine.pings.get(), 3);
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let engine = FlakyEngine {
            failures_left: Cell::new(10),
            pings: Cell::new(0),
        };
        let err = wait_until_reachable(&engine, &source(2)).unwrap_err();
        assert!(matches!(err, VaultError::Connectivity(_)));
        assert!(err.to_string().contains("2 attempt"));
        assert_eq!(engine.pings.get(), 2);
    }
}
