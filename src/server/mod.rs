//! treesync - Server Library
//!
//! High-level API for treesync servers: the listener, per-client sessions
//! and dispatch of requests to the echo and file-watch handlers.

mod dispatch;
#[allow(clippy::module_inception)]
mod server;
mod session;

pub use dispatch::*;
pub use server::*;
pub use session::*;
