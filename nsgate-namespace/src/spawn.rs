//! Platform boundary for creating the isolated child
//!
//! This module uses `unsafe` for clone(2), which is inherently unsafe
//! but the only way to place a child into new namespaces at creation time.

#![allow(unsafe_code)]

use nix::sched::{clone, CloneFlags};
use nix::sys::signal::Signal;
use nsgate_core::{Error, ProcessId, Result};

/// Capability to start a child process in new namespaces
///
/// `entry` must run in a separate copy of the caller's address space: the
/// launcher relies on the child's mutations being invisible to the parent.
pub trait IsolatedSpawner {
    /// Start `entry` in a new process created with `flags`
    ///
    /// The process exits with the value `entry` returns. It signals
    /// `SIGCHLD` to the parent on termination.
    ///
    /// # Errors
    /// Returns [`Error::Spawn`] if the process cannot be created
    fn spawn_isolated(
        &self,
        flags: CloneFlags,
        entry: &mut dyn FnMut() -> isize,
    ) -> Result<ProcessId>;
}

/// [`IsolatedSpawner`] backed by clone(2)
#[derive(Debug, Clone, Copy)]
pub struct CloneSpawner {
    stack_size: usize,
}

impl CloneSpawner {
    /// Create a spawner whose children get `stack_size` bytes of stack
    #[must_use]
    pub const fn new(stack_size: usize) -> Self {
        Self { stack_size }
    }
}

impl IsolatedSpawner for CloneSpawner {
    fn spawn_isolated(
        &self,
        flags: CloneFlags,
        entry: &mut dyn FnMut() -> isize,
    ) -> Result<ProcessId> {
        // Owned by this call; the child runs on its own copy.
        let mut stack = vec![0u8; self.stack_size];

        tracing::debug!(
            flags = ?flags,
            stack_size = self.stack_size,
            "Cloning child process"
        );

        // SAFETY: no CLONE_VM, so the child gets a private copy of memory
        // and file descriptors. The callback only touches data prepared
        // before the call and ends in exec or exit.
        let pid = unsafe {
            clone(
                Box::new(|| entry()),
                &mut stack,
                flags,
                Some(Signal::SIGCHLD as i32),
            )
        }
        .map_err(|e| {
            tracing::error!(error = %e, flags = ?flags, "clone failed");
            Error::Spawn {
                message: format!("clone into new namespaces failed: {e}"),
            }
        })?;

        Ok(ProcessId::from(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};

    #[test]
    fn test_plain_clone_exit_code() {
        let spawner = CloneSpawner::new(256 * 1024);
        let mut entry = || 7;

        let pid = spawner
            .spawn_isolated(CloneFlags::empty(), &mut entry)
            .unwrap();

        match waitpid(pid.as_nix_pid(), None).unwrap() {
            WaitStatus::Exited(_, code) => assert_eq!(code, 7),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_child_mutations_stay_in_child() {
        let spawner = CloneSpawner::new(256 * 1024);
        let mut counter = 0;
        let mut entry = || {
            counter += 1;
            0
        };

        let pid = spawner
            .spawn_isolated(CloneFlags::empty(), &mut entry)
            .unwrap();
        waitpid(pid.as_nix_pid(), None).unwrap();

        assert_eq!(counter, 0);
    }
}
