//! Namespace and launch configuration

use nix::sched::CloneFlags;
use nsgate_core::{Error, IdMapping, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Namespace configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Enable user namespace
    pub user: bool,

    /// Enable network namespace
    pub network: bool,

    /// Enable mount namespace
    pub mount: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            user: true,
            network: true,
            mount: true,
        }
    }
}

impl NamespaceConfig {
    /// Create a new namespace configuration (user, network and mount)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No isolation at all; the child is a plain fork
    #[must_use]
    pub const fn none() -> Self {
        Self {
            user: false,
            network: false,
            mount: false,
        }
    }

    /// Enable user namespace
    #[must_use]
    pub const fn with_user(mut self, enable: bool) -> Self {
        self.user = enable;
        self
    }

    /// Enable network namespace
    #[must_use]
    pub const fn with_network(mut self, enable: bool) -> Self {
        self.network = enable;
        self
    }

    /// Enable mount namespace
    #[must_use]
    pub const fn with_mount(mut self, enable: bool) -> Self {
        self.mount = enable;
        self
    }

    /// Convert to clone flags for clone(2)
    #[must_use]
    pub fn to_clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();

        if self.user {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }

        flags
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<&'static str> {
        let mut namespaces = Vec::new();

        if self.user {
            namespaces.push("user");
        }
        if self.network {
            namespaces.push("net");
        }
        if self.mount {
            namespaces.push("mnt");
        }

        namespaces
    }
}

/// Everything the launcher needs besides the command itself
///
/// Defaults reproduce the single fixed deployment: ids `0:1000:65000`,
/// interface `eth0` moved by `/bin/network`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Namespaces created at clone time
    pub namespaces: NamespaceConfig,

    /// Range written to both `uid_map` and `gid_map`; `None` skips the maps
    pub id_mapping: Option<IdMapping>,

    /// Write `deny` to `setgroups` before the gid map
    pub deny_setgroups: bool,

    /// Interface moved into the child's network namespace; `None` skips migration
    pub interface: Option<String>,

    /// External helper that performs the migration
    pub helper: PathBuf,

    /// Stack size handed to clone(2)
    pub stack_size: usize,

    /// Mount point of procfs
    pub proc_root: PathBuf,
}

impl LaunchConfig {
    /// Default interface name
    pub const DEFAULT_INTERFACE: &'static str = "eth0";

    /// Default migration helper
    pub const DEFAULT_HELPER: &'static str = "/bin/network";

    /// Default child stack size (1 MiB)
    pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

    /// Smallest stack the launcher accepts
    pub const MIN_STACK_SIZE: usize = 64 * 1024;

    /// Longest interface name the kernel accepts (`IFNAMSIZ - 1`)
    pub const MAX_INTERFACE_LEN: usize = 15;

    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration from a JSON file; missing fields
    /// take defaults
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::parse_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file without validating it
    ///
    /// For callers that layer further overrides on top and validate the
    /// merged result.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn parse_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::invalid_config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Set the namespaces
    #[must_use]
    pub const fn with_namespaces(mut self, namespaces: NamespaceConfig) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Set the identity range
    #[must_use]
    pub const fn with_id_mapping(mut self, mapping: Option<IdMapping>) -> Self {
        self.id_mapping = mapping;
        self
    }

    /// Enable writing `deny` to `setgroups`
    #[must_use]
    pub const fn with_deny_setgroups(mut self, enable: bool) -> Self {
        self.deny_setgroups = enable;
        self
    }

    /// Set the interface to migrate
    #[must_use]
    pub fn with_interface(mut self, interface: Option<impl Into<String>>) -> Self {
        self.interface = interface.map(Into::into);
        self
    }

    /// Set the migration helper
    #[must_use]
    pub fn with_helper(mut self, helper: impl Into<PathBuf>) -> Self {
        self.helper = helper.into();
        self
    }

    /// Set the clone stack size
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Set the procfs mount point
    #[must_use]
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Check the configuration for combinations that can never launch
    ///
    /// On top of [`Self::validate_settings`], the kernel only accepts
    /// identity maps and a setgroups denial for a child in a new user
    /// namespace, and an interface can only be moved into a new network
    /// namespace.
    ///
    /// # Errors
    /// Returns error describing the first problem found
    pub fn validate(&self) -> Result<()> {
        self.validate_settings()?;

        if !self.namespaces.user {
            if self.id_mapping.is_some() {
                return Err(Error::invalid_config(
                    "An identity map requires a user namespace",
                ));
            }
            if self.deny_setgroups {
                return Err(Error::invalid_config(
                    "Denying setgroups requires a user namespace",
                ));
            }
        }

        if !self.namespaces.network && self.interface.is_some() {
            return Err(Error::invalid_config(
                "Interface migration requires a network namespace",
            ));
        }

        Ok(())
    }

    /// Check each setting on its own, ignoring which namespaces are created
    ///
    /// # Errors
    /// Returns error describing the first problem found
    pub fn validate_settings(&self) -> Result<()> {
        if self.namespaces.user && self.id_mapping.is_none() {
            return Err(Error::invalid_config(
                "A user namespace requires an identity map",
            ));
        }

        if self.id_mapping.is_some_and(|m| m.host_id(0).is_none()) {
            return Err(Error::invalid_config(
                "Identity map must cover in-namespace id 0",
            ));
        }

        if let Some(ref interface) = self.interface {
            if interface.is_empty() || interface.len() > Self::MAX_INTERFACE_LEN {
                return Err(Error::invalid_config(format!(
                    "Interface name must be 1-{} bytes, got: {interface:?}",
                    Self::MAX_INTERFACE_LEN
                )));
            }

            if interface.contains(['/', ' ', '\0']) {
                return Err(Error::invalid_config(format!(
                    "Invalid interface name: {interface:?}"
                )));
            }

            if self.helper.as_os_str().is_empty() {
                return Err(Error::invalid_config("Migration helper path is empty"));
            }
        }

        if self.stack_size < Self::MIN_STACK_SIZE {
            return Err(Error::invalid_config(format!(
                "Stack size must be at least {} bytes, got: {}",
                Self::MIN_STACK_SIZE,
                self.stack_size
            )));
        }

        Ok(())
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            namespaces: NamespaceConfig::default(),
            id_mapping: Some(IdMapping::default()),
            deny_setgroups: false,
            interface: Some(Self::DEFAULT_INTERFACE.to_string()),
            helper: PathBuf::from(Self::DEFAULT_HELPER),
            stack_size: Self::DEFAULT_STACK_SIZE,
            proc_root: PathBuf::from("/proc"),
        }
    }
}
