//! Launch a program in new user, network and mount namespaces
//!
//! The launcher:
//! 1. Creates the gate
//! 2. Clones the child, which blocks on the gate
//! 3. Writes the child's uid and gid maps
//! 4. Moves the network interface into the child's namespace
//! 5. Releases the gate; the child becomes 0:0 and execs
//! 6. Reaps the child
//!
//! If any step before the release fails, the child is killed and reaped
//! while the gate is still shut, so it never runs past its gate.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nsgate_core::{Error, IdKind, LaunchEvent, LaunchRequest, ProcessId, Result};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::child::{self, ExecArgs};
use crate::config::LaunchConfig;
use crate::gate::{self, GateWriter};
use crate::idmap::{IdentityBackend, IdentityMapper};
use crate::inspect::NamespaceInfo;
use crate::migrate::InterfaceMigrator;
use crate::spawn::{CloneSpawner, IsolatedSpawner};

/// How the child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// Exited with a code
    Exited(i32),
    /// Killed by a signal number
    Signaled(i32),
}

impl ChildStatus {
    /// Shell-style code: the exit code, or 128 + signal number
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
        }
    }

    /// Whether the child exited with code 0
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Child-side setup failure this status stands for, if any
    ///
    /// The child reserves exit codes 125-127 for failures before exec. A
    /// target that exits with one of them itself cannot be told apart.
    #[must_use]
    pub fn setup_failure(self) -> Option<Error> {
        match self {
            Self::Exited(child::EXIT_SYNC_FAILURE) => {
                Some(Error::sync("child could not sync with the gate"))
            }
            Self::Exited(child::EXIT_PRIVILEGE_FAILURE) => Some(Error::Privilege {
                message: "child could not become 0:0 in its namespace".to_string(),
            }),
            Self::Exited(child::EXIT_EXEC_FAILURE) => Some(Error::Exec {
                message: "child could not execute the target".to_string(),
            }),
            _ => None,
        }
    }
}

/// Result of a completed launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// PID the child had in the parent's namespace
    pub child: ProcessId,
    /// How the child terminated
    pub status: ChildStatus,
}

/// Clones, prepares, releases and reaps an isolated child
#[derive(Debug)]
pub struct NamespaceLauncher<S = CloneSpawner, M = IdentityMapper> {
    config: LaunchConfig,
    spawner: S,
    mapper: M,
    migrator: InterfaceMigrator,
}

impl NamespaceLauncher {
    /// Create a launcher that clones with clone(2) and writes maps under
    /// the configured procfs root
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(config: LaunchConfig) -> Result<Self> {
        let spawner = CloneSpawner::new(config.stack_size);
        let mapper = IdentityMapper::with_proc_root(&config.proc_root);
        Self::with_parts(config, spawner, mapper)
    }
}

impl<S: IsolatedSpawner, M: IdentityBackend> NamespaceLauncher<S, M> {
    /// Create a launcher from explicit spawner and identity backends
    ///
    /// The full [`LaunchConfig::validate`] applies unless `mapper` reports
    /// that it does not need real namespaces, in which case only
    /// [`LaunchConfig::validate_settings`] does.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn with_parts(config: LaunchConfig, spawner: S, mapper: M) -> Result<Self> {
        if mapper.requires_isolation() {
            config.validate()?;
        } else {
            config.validate_settings()?;
        }
        let migrator = InterfaceMigrator::new(&config.helper);

        Ok(Self {
            config,
            spawner,
            mapper,
            migrator,
        })
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Get the identity backend
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Run `request` in new namespaces and wait for it
    ///
    /// Returns once the child has been reaped. The child's own exit code is
    /// reported in the outcome, not as an error.
    ///
    /// The child neither allocates nor takes locks before exec, so calling
    /// this from a multithreaded process is sound. The clone still copies
    /// only the calling thread.
    ///
    /// # Errors
    /// Returns error if the child cannot be cloned, prepared, or reaped
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        // Laid out before clone so the child's exec path does not allocate.
        let exec_args = ExecArgs::new(request.to_exec_args()?);
        let reassert_root = self.config.namespaces.user;
        let flags = self.config.namespaces.to_clone_flags();
        let namespaces = self.config.namespaces.enabled_namespaces();

        info!(
            command = %request,
            namespaces = ?namespaces,
            "Launching command"
        );

        // The entry closure runs only in the child's copy of memory, so the
        // parent still holds both ends after the clone.
        let mut gate = Some(gate::channel()?);
        let mut entry = || child::run(&exec_args, gate.take(), reassert_root);
        let child = self.spawner.spawn_isolated(flags, &mut entry)?;

        let Some((reader, mut writer)) = gate.take() else {
            abort_child(child, "gate handles missing after clone");
            return Err(Error::sync("gate handles missing after clone"));
        };
        drop(reader);

        LaunchEvent::Cloned {
            pid: child,
            namespaces: namespaces.iter().map(ToString::to_string).collect(),
            timestamp: SystemTime::now(),
        }
        .emit_trace();
        log_namespaces(child);

        if let Err(e) = self.prepare_child(child) {
            abort_child(child, &e.to_string());
            drop(writer);
            return Err(e);
        }

        release(&mut writer, child)?;

        let status = wait_for_exit(child)?;
        LaunchEvent::Reaped {
            pid: child,
            exit_code: status.code(),
            timestamp: SystemTime::now(),
        }
        .emit_trace();

        Ok(LaunchOutcome { child, status })
    }

    /// Everything that must be in place before the child may proceed
    fn prepare_child(&self, child: ProcessId) -> Result<()> {
        if let Some(mapping) = self.config.id_mapping {
            self.mapper
                .write_identity_map(child, IdKind::Uid, &[mapping])?;
            LaunchEvent::IdentityMapped {
                pid: child,
                kind: IdKind::Uid,
                mapping,
                timestamp: SystemTime::now(),
            }
            .emit_trace();

            if self.config.deny_setgroups {
                self.mapper.deny_setgroups(child)?;
            }

            self.mapper
                .write_identity_map(child, IdKind::Gid, &[mapping])?;
            LaunchEvent::IdentityMapped {
                pid: child,
                kind: IdKind::Gid,
                mapping,
                timestamp: SystemTime::now(),
            }
            .emit_trace();
        }

        if let Some(ref interface) = self.config.interface {
            self.migrator.migrate_interface(interface, child)?;
            LaunchEvent::InterfaceMigrated {
                pid: child,
                interface: interface.clone(),
                timestamp: SystemTime::now(),
            }
            .emit_trace();
        }

        Ok(())
    }
}

fn release(writer: &mut GateWriter, child: ProcessId) -> Result<()> {
    writer.release()?;
    LaunchEvent::Released {
        pid: child,
        timestamp: SystemTime::now(),
    }
    .emit_trace();
    Ok(())
}

fn log_namespaces(child: ProcessId) {
    match (NamespaceInfo::current(), NamespaceInfo::for_pid(child)) {
        (Ok(parent), Ok(ns)) => debug!(
            child_pid = %child,
            parent = %parent,
            child = %ns,
            isolated = ns.differs_from(&parent),
            "Namespace identities"
        ),
        (Err(e), _) | (_, Err(e)) => debug!(error = %e, "Could not read namespace identities"),
    }
}

/// Kill and reap a child that is still held by the gate
fn abort_child(child: ProcessId, reason: &str) {
    LaunchEvent::Aborted {
        pid: child,
        message: reason.to_string(),
        timestamp: SystemTime::now(),
    }
    .emit_trace();

    match kill(child.as_nix_pid(), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(child_pid = %child, error = %e, "Failed to kill child"),
    }

    if let Err(e) = wait_for_exit(child) {
        warn!(child_pid = %child, error = %e, "Failed to reap aborted child");
    }
}

/// Block until `child` terminates
fn wait_for_exit(child: ProcessId) -> Result<ChildStatus> {
    loop {
        match waitpid(child.as_nix_pid(), None) {
            Ok(WaitStatus::Exited(_, exit_code)) => {
                debug!(child_pid = %child, exit_code, "Child exited");
                return Ok(ChildStatus::Exited(exit_code));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                debug!(child_pid = %child, signal = ?signal, "Child terminated by signal");
                return Ok(ChildStatus::Signaled(signal as i32));
            }
            Ok(status) => {
                debug!(child_pid = %child, status = ?status, "Child status");
            }
            Err(Errno::EINTR) => {
                debug!("Wait interrupted by signal, continuing...");
            }
            Err(e) => {
                return Err(Error::sync(format!("failed to wait for child {child}: {e}")));
            }
        }
    }
}
