//! Namespace identity inspection through `/proc/<pid>/ns`

use nsgate_core::{Error, ProcessId, Result};
use std::fs;

/// Namespace identifiers of one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// User namespace ID
    pub user: Option<String>,
    /// Network namespace ID
    pub net: Option<String>,
    /// Mount namespace ID
    pub mnt: Option<String>,
}

impl NamespaceInfo {
    /// Get namespace IDs of the current process
    ///
    /// # Errors
    /// Returns error if no namespace link can be read
    pub fn current() -> Result<Self> {
        Self::for_pid(ProcessId::current())
    }

    /// Get namespace IDs for a specific PID
    ///
    /// # Errors
    /// Returns error if no namespace link can be read
    pub fn for_pid(pid: ProcessId) -> Result<Self> {
        let base_path = format!("/proc/{pid}/ns");

        let read_ns = |name: &str| -> Option<String> {
            fs::read_link(format!("{base_path}/{name}"))
                .map(|p| p.to_string_lossy().into_owned())
                .ok()
        };

        let info = Self {
            user: read_ns("user"),
            net: read_ns("net"),
            mnt: read_ns("mnt"),
        };

        if info.user.is_none() && info.net.is_none() && info.mnt.is_none() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no readable namespace links under {base_path}"),
            )));
        }

        Ok(info)
    }

    /// Check that every namespace differs from `other`'s
    ///
    /// An unreadable namespace on either side counts as not differing.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        let differs = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        };

        differs(&self.user, &other.user)
            && differs(&self.net, &other.net)
            && differs(&self.mnt, &other.mnt)
    }
}

impl std::fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |ns: &Option<String>| ns.clone().unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "user={} net={} mnt={}",
            show(&self.user),
            show(&self.net),
            show(&self.mnt)
        )
    }
}
