//! Identity map writing for user namespaces
//!
//! The parent writes `/proc/<pid>/uid_map` and `/proc/<pid>/gid_map` for the
//! gated child. The child cannot do this itself: it has no mapping yet, so
//! it cannot gain `CAP_SETUID` in its own namespace.

use nsgate_core::{Error, IdKind, IdMapping, ProcessId, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Trait for identity map backends
///
/// This allows for different implementations:
/// - [`IdentityMapper`] - Production procfs writer
/// - [`MockIdentityBackend`] - Testing without procfs
pub trait IdentityBackend {
    /// Write one map kind for `target`
    ///
    /// # Errors
    /// Returns error if the map cannot be written in full
    fn write_identity_map(
        &self,
        target: ProcessId,
        kind: IdKind,
        entries: &[IdMapping],
    ) -> Result<()>;

    /// Disable `setgroups(2)` for `target`, required before an unprivileged
    /// writer may set the gid map
    ///
    /// # Errors
    /// Returns error if the setgroups file cannot be written
    fn deny_setgroups(&self, target: ProcessId) -> Result<()>;

    /// Whether writes only succeed for a child in real new namespaces
    ///
    /// Backends that merely record calls return `false`, which lets the
    /// launch sequence run without privileges.
    fn requires_isolation(&self) -> bool {
        true
    }
}

/// Writes identity maps through procfs
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    proc_root: PathBuf,
}

impl Default for IdentityMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMapper {
    /// Create a mapper for `/proc`
    #[must_use]
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Create a mapper rooted at another procfs mount
    #[must_use]
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Path of the map file for `target`
    #[must_use]
    pub fn map_path(&self, target: ProcessId, kind: IdKind) -> PathBuf {
        self.proc_root
            .join(target.to_string())
            .join(kind.map_file())
    }

    fn setgroups_path(&self, target: ProcessId) -> PathBuf {
        self.proc_root.join(target.to_string()).join("setgroups")
    }
}

impl IdentityBackend for IdentityMapper {
    fn write_identity_map(
        &self,
        target: ProcessId,
        kind: IdKind,
        entries: &[IdMapping],
    ) -> Result<()> {
        let path = self.map_path(target, kind);
        let payload = serialize_entries(entries)?;

        tracing::debug!(
            path = %path.display(),
            pid = %target,
            kind = %kind,
            entries = entries.len(),
            "Writing identity map"
        );

        write_proc_file(&path, payload.as_bytes())
    }

    fn deny_setgroups(&self, target: ProcessId) -> Result<()> {
        let path = self.setgroups_path(target);
        tracing::debug!(path = %path.display(), pid = %target, "Denying setgroups");
        write_proc_file(&path, b"deny")
    }
}

/// Serialize entries as one `"<inner> <outer> <length>"` line each
///
/// # Errors
/// Returns error if `entries` is empty
pub fn serialize_entries(entries: &[IdMapping]) -> Result<String> {
    if entries.is_empty() {
        return Err(Error::invalid_config("Identity map needs at least one entry"));
    }

    Ok(entries
        .iter()
        .map(|entry| entry.to_map_line() + "\n")
        .collect())
}

fn write_proc_file(path: &Path, payload: &[u8]) -> Result<()> {
    // The file is closed when `file` drops, on every return path.
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| Error::Identity {
            path: path.to_path_buf(),
            message: format!("open failed: {e}"),
        })?;

    write_once(&mut file, path, payload)
}

/// Hand `payload` to `sink` in a single `write` call
///
/// The kernel parses a map write as one unit, so a partial write is a
/// failure, never something to resume.
///
/// # Errors
/// Returns [`Error::Identity`] if the write fails or [`Error::ShortWrite`]
/// if fewer bytes than `payload` were accepted
pub fn write_once<W: Write>(sink: &mut W, path: &Path, payload: &[u8]) -> Result<()> {
    let written = sink.write(payload).map_err(|e| Error::Identity {
        path: path.to_path_buf(),
        message: format!("write failed: {e}"),
    })?;

    if written != payload.len() {
        return Err(Error::ShortWrite {
            path: path.to_path_buf(),
            written,
            expected: payload.len(),
        });
    }

    Ok(())
}

/// One call recorded by [`MockIdentityBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRecord {
    /// Target process
    pub pid: ProcessId,
    /// Map kind
    pub kind: IdKind,
    /// Entries requested
    pub entries: Vec<IdMapping>,
    /// `/proc/<pid>/exe` of the target when the write happened
    pub target_exe: Option<PathBuf>,
}

/// Mock backend for testing (doesn't touch the target's maps)
///
/// Records every write along with the target's executable at that moment,
/// which shows whether the target had already exec'd.
///
/// # Example
/// ```
/// use nsgate_core::{IdKind, IdMapping, ProcessId};
/// use nsgate_namespace::{IdentityBackend, MockIdentityBackend};
///
/// let backend = MockIdentityBackend::new();
/// let pid = ProcessId::current();
///
/// backend
///     .write_identity_map(pid, IdKind::Uid, &[IdMapping::default()])
///     .unwrap();
///
/// let records = backend.records();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].kind, IdKind::Uid);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockIdentityBackend {
    state: Arc<Mutex<MockState>>,
    truncate: Option<(IdKind, usize)>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MockState {
    records: Vec<MapRecord>,
    setgroups_denied: Vec<ProcessId>,
}

impl MockIdentityBackend {
    /// Create a mock that accepts every write
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only `limit` bytes of the `kind` map, producing a short write
    #[must_use]
    pub const fn truncating(mut self, kind: IdKind, limit: usize) -> Self {
        self.truncate = Some((kind, limit));
        self
    }

    /// Sleep before every write
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Writes seen so far
    #[must_use]
    pub fn records(&self) -> Vec<MapRecord> {
        self.lock().records.clone()
    }

    /// Targets whose setgroups was denied
    #[must_use]
    pub fn setgroups_denied(&self) -> Vec<ProcessId> {
        self.lock().setgroups_denied.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityBackend for MockIdentityBackend {
    fn write_identity_map(
        &self,
        target: ProcessId,
        kind: IdKind,
        entries: &[IdMapping],
    ) -> Result<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let target_exe = std::fs::read_link(format!("/proc/{target}/exe")).ok();
        self.lock().records.push(MapRecord {
            pid: target,
            kind,
            entries: entries.to_vec(),
            target_exe,
        });

        let payload = serialize_entries(entries)?;
        let path = PathBuf::from(format!("/proc/{target}/{}", kind.map_file()));
        let mut sink = TruncatingSink::new(match self.truncate {
            Some((truncated, limit)) if truncated == kind => limit,
            _ => usize::MAX,
        });

        write_once(&mut sink, &path, payload.as_bytes())
    }

    fn deny_setgroups(&self, target: ProcessId) -> Result<()> {
        self.lock().setgroups_denied.push(target);
        Ok(())
    }

    fn requires_isolation(&self) -> bool {
        false
    }
}

/// Sink that accepts at most `limit` bytes per write
struct TruncatingSink {
    limit: usize,
    data: Vec<u8>,
}

impl TruncatingSink {
    const fn new(limit: usize) -> Self {
        Self {
            limit,
            data: Vec::new(),
        }
    }
}

impl Write for TruncatingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.limit);
        self.data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
