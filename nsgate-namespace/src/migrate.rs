//! Network interface migration through an external helper
//!
//! Moving a link into another network namespace is left to a separate
//! program so the launcher itself never needs netlink access. The helper is
//! called as `helper <pid>` with the interface name in [`INTERFACE_ENV`];
//! only its exit status is inspected.
//!
//! On success the interface sits inside the target namespace, down and
//! without an address. Bringing it up is the caller's business.

use nsgate_core::{Error, MigrationStage, ProcessId, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Environment variable carrying the interface name to the helper
pub const INTERFACE_ENV: &str = "NSGATE_INTERFACE";

/// Invokes the migration helper
#[derive(Debug, Clone)]
pub struct InterfaceMigrator {
    helper: PathBuf,
}

impl InterfaceMigrator {
    /// Create a migrator for the given helper binary
    #[must_use]
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    /// Move interface `name` into the network namespace of `target`
    ///
    /// Blocks until the helper exits.
    ///
    /// # Errors
    /// Returns [`Error::Migration`] if the helper cannot be spawned or
    /// executed, cannot be reaped, or exits unsuccessfully
    pub fn migrate_interface(&self, name: &str, target: ProcessId) -> Result<()> {
        tracing::debug!(
            helper = %self.helper.display(),
            interface = name,
            pid = %target,
            "Running interface migration helper"
        );

        let mut child = Command::new(&self.helper)
            .arg(target.to_string())
            .env(INTERFACE_ENV, name)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        let status = child.wait().map_err(|e| {
            Error::migration(
                MigrationStage::Wait,
                format!("waiting on {} failed: {e}", self.helper.display()),
            )
        })?;

        if !status.success() {
            tracing::error!(
                helper = %self.helper.display(),
                interface = name,
                %status,
                "Migration helper failed"
            );
            return Err(Error::migration(
                MigrationStage::HelperFailed,
                format!("{} {target} {status}", self.helper.display()),
            ));
        }

        Ok(())
    }

    fn spawn_error(&self, err: &std::io::Error) -> Error {
        let stage = match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => MigrationStage::Exec,
            _ => MigrationStage::Spawn,
        };

        Error::migration(
            stage,
            format!("cannot run {}: {err}", self.helper.display()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn write_helper(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("helper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_successful_helper() {
        let migrator = InterfaceMigrator::new("/bin/true");
        assert!(
            migrator
                .migrate_interface("eth0", ProcessId::current())
                .is_ok()
        );
    }

    #[test]
    fn test_failing_helper() {
        let migrator = InterfaceMigrator::new("/bin/false");
        let err = migrator
            .migrate_interface("eth0", ProcessId::current())
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Migration {
                stage: MigrationStage::HelperFailed,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_helper_is_exec_error() {
        let migrator = InterfaceMigrator::new("/nonexistent/nsgate-network-helper");
        let err = migrator
            .migrate_interface("eth0", ProcessId::current())
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Migration {
                stage: MigrationStage::Exec,
                ..
            }
        ));
    }

    #[test]
    fn test_helper_receives_pid_and_interface() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let helper = write_helper(
            dir.path(),
            &format!("echo \"$1 ${INTERFACE_ENV}\" > {}", out.display()),
        );

        InterfaceMigrator::new(&helper)
            .migrate_interface("veth7", ProcessId::from_raw(4321))
            .unwrap();

        let seen = std::fs::read_to_string(out).unwrap();
        assert_eq!(seen.trim(), "4321 veth7");
    }
}
