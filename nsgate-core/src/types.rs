//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Program and arguments to execute inside the isolated child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LaunchRequest {
    argv: Vec<String>,
}

impl LaunchRequest {
    /// Create a request from a program and its arguments
    ///
    /// # Errors
    /// Returns error if the program is empty or any element contains a NUL byte
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![program.into()];
        argv.extend(args.into_iter().map(Into::into));
        Self::from_argv(argv)
    }

    /// Create a request from a full argument vector (`argv[0]` is the program)
    ///
    /// # Errors
    /// Returns error if the vector is empty, the program is empty, or any
    /// element contains a NUL byte
    pub fn from_argv(argv: Vec<String>) -> Result<Self> {
        Self::validate(&argv)?;
        Ok(Self { argv })
    }

    fn validate(argv: &[String]) -> Result<()> {
        let Some(program) = argv.first() else {
            return Err(Error::invalid_config("Command cannot be empty"));
        };

        if program.is_empty() {
            return Err(Error::invalid_config("Program cannot be empty"));
        }

        if let Some(arg) = argv.iter().find(|arg| arg.contains('\0')) {
            return Err(Error::invalid_config(format!(
                "Argument contains a NUL byte: {arg:?}"
            )));
        }

        Ok(())
    }

    /// Program path or name, as passed to `execvp`
    #[must_use]
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the program
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Full argument vector, program first
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Convert to the C strings handed to `execvp`
    ///
    /// # Errors
    /// Returns error if an element contains a NUL byte
    pub fn to_exec_args(&self) -> Result<Vec<CString>> {
        self.argv
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes())
                    .map_err(|e| Error::invalid_config(format!("Invalid argument: {e}")))
            })
            .collect()
    }
}

impl fmt::Display for LaunchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

impl TryFrom<Vec<String>> for LaunchRequest {
    type Error = Error;

    fn try_from(argv: Vec<String>) -> Result<Self> {
        Self::from_argv(argv)
    }
}

impl From<LaunchRequest> for Vec<String> {
    fn from(request: LaunchRequest) -> Self {
        request.argv
    }
}

/// Kind of identity map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    /// User IDs (`uid_map`)
    Uid,
    /// Group IDs (`gid_map`)
    Gid,
}

impl IdKind {
    /// Name of the per-process proc file holding this map
    #[must_use]
    pub const fn map_file(self) -> &'static str {
        match self {
            Self::Uid => "uid_map",
            Self::Gid => "gid_map",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uid => f.write_str("uid"),
            Self::Gid => f.write_str("gid"),
        }
    }
}

/// One identity map entry: `length` ids starting at `inner` inside the
/// namespace map to ids starting at `outer` on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdMapping {
    inner: u32,
    outer: u32,
    length: u32,
}

impl IdMapping {
    /// Host id that becomes root inside the namespace by default
    pub const DEFAULT_OUTER: u32 = 1000;

    /// Width of the default range
    pub const DEFAULT_LENGTH: u32 = 65000;

    /// Create a validated mapping
    ///
    /// # Errors
    /// Returns error if the range is empty or overflows the id space
    pub fn new(inner: u32, outer: u32, length: u32) -> Result<Self> {
        if length == 0 {
            return Err(Error::invalid_config("Identity range length must be positive"));
        }

        if inner.checked_add(length).is_none() || outer.checked_add(length).is_none() {
            return Err(Error::invalid_config(format!(
                "Identity range {inner}:{outer}:{length} overflows the id space"
            )));
        }

        Ok(Self {
            inner,
            outer,
            length,
        })
    }

    /// First id inside the namespace
    #[must_use]
    pub const fn inner(self) -> u32 {
        self.inner
    }

    /// First id on the host
    #[must_use]
    pub const fn outer(self) -> u32 {
        self.outer
    }

    /// Number of ids in the range
    #[must_use]
    pub const fn length(self) -> u32 {
        self.length
    }

    /// Line in the format the kernel expects: `"<inner> <outer> <length>"`
    #[must_use]
    pub fn to_map_line(self) -> String {
        format!("{} {} {}", self.inner, self.outer, self.length)
    }

    /// Map an in-namespace id to its host id, if covered by this range
    #[must_use]
    pub fn host_id(self, inner: u32) -> Option<u32> {
        let offset = inner.checked_sub(self.inner)?;
        (offset < self.length).then(|| self.outer + offset)
    }
}

impl Default for IdMapping {
    fn default() -> Self {
        Self {
            inner: 0,
            outer: Self::DEFAULT_OUTER,
            length: Self::DEFAULT_LENGTH,
        }
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.inner, self.outer, self.length)
    }
}

impl FromStr for IdMapping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [inner, outer, length] = parts.as_slice() else {
            return Err(Error::invalid_config(format!(
                "Identity map must be INNER:OUTER:LENGTH, got: {s}"
            )));
        };

        let parse = |field: &str, value: &str| -> Result<u32> {
            value.trim().parse().map_err(|e| {
                Error::invalid_config(format!("Invalid {field} id in {s:?}: {e}"))
            })
        };

        Self::new(
            parse("inner", inner)?,
            parse("outer", outer)?,
            parse("length", length)?,
        )
    }
}

impl TryFrom<String> for IdMapping {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<IdMapping> for String {
    fn from(mapping: IdMapping) -> Self {
        mapping.to_string()
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        Self::from(nix::unistd::getpid())
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        nix::unistd::Pid::from_raw(pid.0)
    }
}
