//! Code that runs inside the cloned child
//!
//! Everything here executes between clone(2) and execvp(3). The clone copies
//! only the calling thread, so any lock another thread held at that moment
//! (the allocator's, the stderr handle's) stays locked forever in the child.
//! This path therefore neither allocates nor formats: the argument vector is
//! laid out before the clone and failures go to stderr as raw byte slices.
//! The parent only ever sees the exit status.

#![allow(unsafe_code)]

use nix::errno::Errno;
use nix::unistd::{setgid, setuid, Gid, Uid};
use std::ffi::{c_char, CString};

use crate::gate::{GateFault, GateReader, GateWriter};

/// Exit code when the gate reported anything but a clean release
pub const EXIT_SYNC_FAILURE: i32 = 125;

/// Exit code when the child could not become 0:0 in its namespace
pub const EXIT_PRIVILEGE_FAILURE: i32 = 126;

/// Exit code when the target program could not be executed
pub const EXIT_EXEC_FAILURE: i32 = 127;

/// Argument vector in the shape execvp(3) takes
///
/// `ptrs` points into the heap buffers owned by `args` and ends with NULL.
/// Moving the struct does not move those buffers.
pub(crate) struct ExecArgs {
    args: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl ExecArgs {
    pub(crate) fn new(args: Vec<CString>) -> Self {
        let mut ptrs: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        Self { args, ptrs }
    }
}

/// Child entry point: wait for the parent, take root, exec the target
///
/// Never returns on success.
pub(crate) fn run(
    exec_args: &ExecArgs,
    gate: Option<(GateReader, GateWriter)>,
    reassert_root: bool,
) -> isize {
    let Some((reader, writer)) = gate else {
        report(&[b"nsgate: child started without gate handles\n"]);
        return EXIT_SYNC_FAILURE as isize;
    };

    // The child never writes; holding the write end would keep the gate shut.
    drop(writer);

    match reader.wait() {
        Ok(()) => {}
        Err(GateFault::Payload(_)) => {
            report(&[b"nsgate: failed to sync with parent process: data on gate\n"]);
            return EXIT_SYNC_FAILURE as isize;
        }
        Err(GateFault::Read(errno)) => {
            report(&[
                b"nsgate: failed to sync with parent process: ",
                errno.desc().as_bytes(),
                b"\n",
            ]);
            return EXIT_SYNC_FAILURE as isize;
        }
    }

    if reassert_root {
        if let Err((step, errno)) = become_root() {
            report(&[b"nsgate: ", step, b" failed: ", errno.desc().as_bytes(), b"\n"]);
            return EXIT_PRIVILEGE_FAILURE as isize;
        }
    }

    let errno = exec(exec_args);
    let program = exec_args.args.first().map_or(&b""[..], |p| p.as_bytes());
    report(&[
        b"nsgate: Exec error: failed to execute ",
        program,
        b": ",
        errno.desc().as_bytes(),
        b"\n",
    ]);
    EXIT_EXEC_FAILURE as isize
}

/// Switch to 0:0 inside the user namespace
///
/// Only possible once the parent has written the maps: the mapping is what
/// gives 0 a meaning here.
fn become_root() -> std::result::Result<(), (&'static [u8], Errno)> {
    setgid(Gid::from_raw(0)).map_err(|e| (&b"change gid to 0"[..], e))?;
    setuid(Uid::from_raw(0)).map_err(|e| (&b"change uid to 0"[..], e))?;
    Ok(())
}

/// Replace the process image; returns only on failure
fn exec(exec_args: &ExecArgs) -> Errno {
    let Some(&program) = exec_args.ptrs.first().filter(|p| !p.is_null()) else {
        return Errno::EINVAL;
    };

    // SAFETY: `program` and every entry of `ptrs` point at NUL-terminated
    // strings owned by `exec_args.args`, and `ptrs` ends with NULL.
    unsafe {
        libc::execvp(program, exec_args.ptrs.as_ptr());
    }
    Errno::last()
}

/// Write to stderr with one write(2) per slice, without taking the stderr lock
fn report(parts: &[&[u8]]) {
    let stderr = std::io::stderr();
    for &part in parts {
        let _ = nix::unistd::write(&stderr, part);
    }
}
