//! One-shot gate between the launcher and its cloned child
//!
//! The gate is a pipe split into two owned handles. The child holds the
//! [`GateReader`] and blocks until end-of-input; the parent holds the
//! [`GateWriter`] and releases the child by closing its end exactly once.
//! The pipe never carries data. A byte on the pipe is a protocol violation.
//!
//! Dropping a [`GateWriter`] also closes the write end, which the reader
//! cannot tell apart from a release. Callers that abandon a launch must stop
//! the child before the writer goes out of scope.

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use nsgate_core::{Error, Result};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::OwnedFd;

/// Observable state of the parent's side of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Child is still held
    Pending,
    /// Write end closed, child may proceed
    Released,
}

/// Read end, owned by the child
#[derive(Debug)]
pub struct GateReader {
    pipe: File,
}

/// Write end, owned by the parent
#[derive(Debug)]
pub struct GateWriter {
    fd: Option<OwnedFd>,
}

/// Create a new gate in the [`GateState::Pending`] state
///
/// Both ends are close-on-exec so neither leaks into an exec'd image.
///
/// # Errors
/// Returns error if the pipe cannot be created
pub fn channel() -> Result<(GateReader, GateWriter)> {
    let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| Error::sync(format!("Failed to create gate pipe: {e}")))?;

    Ok((
        GateReader {
            pipe: File::from(read_fd),
        },
        GateWriter { fd: Some(write_fd) },
    ))
}

/// Why a wait on the gate ended without a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateFault {
    /// A byte arrived on the pipe
    Payload(u8),
    /// The read itself failed
    Read(Errno),
}

impl GateReader {
    /// Block until the write end is closed
    ///
    /// Consumes the reader: the gate opens once.
    ///
    /// # Errors
    /// Returns [`Error::Sync`] if data arrives on the pipe or the read fails
    pub fn block_until_released(self) -> Result<()> {
        self.wait().map_err(|fault| match fault {
            GateFault::Payload(byte) => {
                Error::sync(format!("unexpected byte {byte:#04x} on gate"))
            }
            GateFault::Read(errno) => Error::sync(format!("gate read failed: {errno}")),
        })
    }

    /// Allocation-free wait, safe to call between clone and exec
    pub(crate) fn wait(self) -> std::result::Result<(), GateFault> {
        let mut pipe = self.pipe;
        let mut buf = [0u8; 1];

        loop {
            match pipe.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => return Err(GateFault::Payload(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    let errno = e.raw_os_error().map_or(Errno::EIO, Errno::from_raw);
                    return Err(GateFault::Read(errno));
                }
            }
        }
    }
}

impl GateWriter {
    /// Current state of the gate
    #[must_use]
    pub const fn state(&self) -> GateState {
        if self.fd.is_some() {
            GateState::Pending
        } else {
            GateState::Released
        }
    }

    /// Release the child by closing the write end
    ///
    /// # Errors
    /// Returns [`Error::Sync`] if the gate was already released; the second
    /// call has no other effect
    pub fn release(&mut self) -> Result<()> {
        match self.fd.take() {
            Some(fd) => {
                drop(fd);
                Ok(())
            }
            None => Err(Error::sync("gate already released")),
        }
    }

    #[cfg(test)]
    pub(crate) fn take_fd_for_test(&mut self) -> OwnedFd {
        self.fd.take().expect("gate already released")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_gate_is_pending() {
        let (_reader, writer) = channel().unwrap();
        assert_eq!(writer.state(), GateState::Pending);
    }

    #[test]
    fn test_release_unblocks_reader() {
        let (reader, mut writer) = channel().unwrap();

        writer.release().unwrap();
        assert_eq!(writer.state(), GateState::Released);
        assert!(reader.block_until_released().is_ok());
    }

    #[test]
    fn test_reader_blocks_until_release() {
        let (reader, mut writer) = channel().unwrap();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = reader.block_until_released();
            tx.send(result.is_ok()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        writer.release().unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_double_release_is_error() {
        let (reader, mut writer) = channel().unwrap();

        writer.release().unwrap();
        let err = writer.release().unwrap_err();
        assert!(matches!(err, Error::Sync { .. }));
        assert_eq!(writer.state(), GateState::Released);

        // The reader still sees exactly one end-of-input
        assert!(reader.block_until_released().is_ok());
    }

    #[test]
    fn test_payload_is_protocol_violation() {
        let (reader, mut writer) = channel().unwrap();

        let mut raw = File::from(writer.take_fd_for_test());
        raw.write_all(b"x").unwrap();
        drop(raw);

        let err = reader.block_until_released().unwrap_err();
        assert!(err.to_string().contains("unexpected byte 0x78"));
    }

    #[test]
    fn test_wait_reports_payload_byte() {
        let (reader, mut writer) = channel().unwrap();

        let mut raw = File::from(writer.take_fd_for_test());
        raw.write_all(b"x").unwrap();
        drop(raw);

        assert_eq!(reader.wait(), Err(GateFault::Payload(b'x')));
    }
}
