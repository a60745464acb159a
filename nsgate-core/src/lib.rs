//! nsgate Core - Foundation types, events, and errors
//!
//! This crate provides the core abstractions shared by the launcher crates.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, MigrationStage, Result};
pub use events::LaunchEvent;
pub use types::{IdKind, IdMapping, LaunchRequest, ProcessId};
