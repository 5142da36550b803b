//! treesync - Sync Layer
//!
//! Implements:
//! - Recursive scanning of a root into a [`Snapshot`]
//! - Poll-based change detection against a prior snapshot and an mtime cutoff
//! - Base64 wire conversion of [`ChangeSet`]s
//! - Application of change-sets with empty-ancestor pruning
//!
//! Everything here is blocking filesystem code; async callers run it on
//! `spawn_blocking`.

mod applier;
mod change;
mod diff;
mod path;
mod scanner;
mod snapshot;

pub use applier::*;
pub use change::*;
pub use diff::*;
pub use path::*;
pub use scanner::*;
pub use snapshot::*;
