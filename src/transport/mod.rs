//! treesync - Transport Layer
//!
//! The connection manager. It provides:
//!
//! - **Dialing with bounded retry**: [`Connection::connect`] with [`ConnectOptions`]
//! - **Accepted streams**: [`Connection::from_stream`] for the server side
//! - **Lifecycle**: [`ConnectionPhase`] and close classification via [`CloseKind`]
//! - **Inbound delivery**: one receive task per connection feeding a [`FrameHandler`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Client / Server APIs             │
//! ├─────────────────────────────────────────┤
//! │        RPC Layer (correlation)          │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   connect, send, receive loop, close    │
//! ├─────────────────────────────────────────┤
//! │       WebSocket (text frames)           │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod error;
mod socket;

pub use connection::*;
pub use error::*;
pub use socket::*;
