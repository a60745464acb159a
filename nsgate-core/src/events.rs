//! Launch lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{IdKind, IdMapping, ProcessId};

/// Events emitted while bootstrapping an isolated child
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaunchEvent {
    /// Child cloned into new namespaces, blocked on the gate
    Cloned {
        /// Child PID
        pid: ProcessId,
        /// Namespaces requested at clone time
        namespaces: Vec<String>,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Identity map written for the child
    IdentityMapped {
        /// Child PID
        pid: ProcessId,
        /// Map kind
        kind: IdKind,
        /// Mapping written
        mapping: IdMapping,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Network interface moved into the child's network namespace
    InterfaceMigrated {
        /// Child PID
        pid: ProcessId,
        /// Interface name
        interface: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Gate released, child allowed to exec
    Released {
        /// Child PID
        pid: ProcessId,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Child reaped
    Reaped {
        /// Child PID
        pid: ProcessId,
        /// Exit code, or 128 + signal number
        exit_code: i32,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Setup failed and the gated child was killed
    Aborted {
        /// Child PID
        pid: ProcessId,
        /// Error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl LaunchEvent {
    /// Get the child PID from any event
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        match self {
            Self::Cloned { pid, .. }
            | Self::IdentityMapped { pid, .. }
            | Self::InterfaceMigrated { pid, .. }
            | Self::Released { pid, .. }
            | Self::Reaped { pid, .. }
            | Self::Aborted { pid, .. } => *pid,
        }
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Cloned {
                pid, namespaces, ..
            } => {
                tracing::info!(
                    child_pid = %pid,
                    namespaces = ?namespaces,
                    event = "cloned",
                    "Child cloned"
                );
            }
            Self::IdentityMapped {
                pid, kind, mapping, ..
            } => {
                tracing::debug!(
                    child_pid = %pid,
                    kind = %kind,
                    mapping = %mapping,
                    event = "identity_mapped",
                    "Identity map written"
                );
            }
            Self::InterfaceMigrated { pid, interface, .. } => {
                tracing::info!(
                    child_pid = %pid,
                    interface = %interface,
                    event = "interface_migrated",
                    "Interface migrated"
                );
            }
            Self::Released { pid, .. } => {
                tracing::debug!(
                    child_pid = %pid,
                    event = "released",
                    "Gate released"
                );
            }
            Self::Reaped { pid, exit_code, .. } => {
                tracing::info!(
                    child_pid = %pid,
                    exit_code,
                    event = "reaped",
                    "Child reaped"
                );
            }
            Self::Aborted { pid, message, .. } => {
                tracing::error!(
                    child_pid = %pid,
                    message = %message,
                    event = "aborted",
                    "Launch aborted"
                );
            }
        }
    }
}

// Custom SystemTime serialization
mod systemtime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_pid() {
        let pid = ProcessId::from_raw(42);
        let event = LaunchEvent::Released {
            pid,
            timestamp: SystemTime::now(),
        };

        assert_eq!(event.pid(), pid);
    }

    #[test]
    fn test_event_serde() {
        let event = LaunchEvent::IdentityMapped {
            pid: ProcessId::from_raw(7),
            kind: IdKind::Gid,
            mapping: IdMapping::default(),
            timestamp: SystemTime::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"identity_mapped""#));
        assert!(json.contains(r#""mapping":"0:1000:65000""#));

        let deserialized: LaunchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.pid(), deserialized.pid());
    }
}
