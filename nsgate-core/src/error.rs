//! Error types for nsgate

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Stage of the interface migration that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStage {
    /// The helper process could not be created
    Spawn,
    /// The helper binary could not be located or executed
    Exec,
    /// Reaping the helper failed
    Wait,
    /// The helper ran but reported failure
    HelperFailed,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Spawn => "spawn",
            Self::Exec => "exec",
            Self::Wait => "wait",
            Self::HelperFailed => "helper",
        };
        f.write_str(stage)
    }
}

/// nsgate error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The isolated child process could not be created
    #[error("Spawn error: {message}")]
    Spawn {
        /// Error message
        message: String,
    },

    /// Gate protocol violation or failed wait on the child
    #[error("Sync error: {message}")]
    Sync {
        /// Error message
        message: String,
    },

    /// An identity map file could not be opened or written
    #[error("Identity map error on {}: {message}", path.display())]
    Identity {
        /// Map file path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The kernel accepted fewer bytes than the serialized map
    #[error("Short write to {}: wrote {written} of {expected} bytes", path.display())]
    ShortWrite {
        /// Map file path
        path: PathBuf,
        /// Bytes actually written
        written: usize,
        /// Bytes in the serialized map
        expected: usize,
    },

    /// The interface migration helper failed
    #[error("Migration error ({stage}): {message}")]
    Migration {
        /// Stage that failed
        stage: MigrationStage,
        /// Error message
        message: String,
    },

    /// The target program could not replace the child image
    #[error("Exec error: {message}")]
    Exec {
        /// Error message
        message: String,
    },

    /// The child could not re-assert its in-namespace identity
    #[error("Privilege error: {message}")]
    Privilege {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

impl Error {
    /// Build an [`Error::InvalidConfig`] from any message
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Build an [`Error::Sync`] from any message
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Build an [`Error::Migration`] for the given stage
    pub fn migration(stage: MigrationStage, message: impl Into<String>) -> Self {
        Self::Migration {
            stage,
            message: message.into(),
        }
    }
}

/// Result type alias for nsgate operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_write_display() {
        let err = Error::ShortWrite {
            path: PathBuf::from("/proc/42/uid_map"),
            written: 3,
            expected: 13,
        };

        assert_eq!(
            err.to_string(),
            "Short write to /proc/42/uid_map: wrote 3 of 13 bytes"
        );
    }

    #[test]
    fn test_migration_display() {
        let err = Error::migration(MigrationStage::HelperFailed, "exited with status 1");
        assert_eq!(
            err.to_string(),
            "Migration error (helper): exited with status 1"
        );
    }
}
