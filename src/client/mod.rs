//! treesync - Client Library
//!
//! High-level API for treesync clients: the session ([`SyncClient`]) and the
//! per-root sync state driven by the polling loop ([`FileWatcher`]).

#[allow(clippy::module_inception)]
mod client;
mod watcher;

pub use client::*;
pub use watcher::*;
