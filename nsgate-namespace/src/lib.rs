//! Namespace launching for one-shot isolated processes
//!
//! This crate places a child into new namespaces and hands it over to a
//! target program:
//! - User namespace - UID/GID mapping written by the parent
//! - Network namespace - Interface moved in by an external helper
//! - Mount namespace - Private mount tree
//!
//! The child is held on a one-shot gate until all of the above is done.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod child;
pub mod config;
pub mod gate;
pub mod idmap;
pub mod inspect;
pub mod launcher;
pub mod migrate;
pub mod spawn;

pub use config::{LaunchConfig, NamespaceConfig};
pub use gate::{GateReader, GateState, GateWriter};
pub use idmap::{IdentityBackend, IdentityMapper, MapRecord, MockIdentityBackend};
pub use inspect::NamespaceInfo;
pub use launcher::{ChildStatus, LaunchOutcome, NamespaceLauncher};
pub use migrate::InterfaceMigrator;
pub use spawn::{CloneSpawner, IsolatedSpawner};
