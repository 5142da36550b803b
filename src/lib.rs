//! # treesync
//!
//! One-way directory tree synchronization over a persistent WebSocket.
//!
//! A client polls a local root, diffs each scan against the snapshot the
//! server last acknowledged, and ships the change-set as a `FILE_WATCH`
//! request. The server applies it to its own root, pruning directories left
//! empty by deletes, and acknowledges. An `ECHO` request on the same
//! connection checks connectivity.
//!
//! - **Correlation**: many requests in flight on one connection, each
//!   matched to its response by `request_id`
//! - **Convergence**: applying a change-set is idempotent and leaves no
//!   empty ancestor directories behind
//! - **Failure reporting**: every waiter learns when the connection drops;
//!   the server reports which entries it could not apply
//!
//! ## Feature Flags
//!
//! - `client` (default): [`client::SyncClient`] and [`client::FileWatcher`]
//! - `server` (default): [`server::SyncServer`]
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types and seam traits (always included)
//! - [`transport`]: WebSocket connection manager (always included)
//! - [`rpc`]: Wire envelope and request correlation (always included)
//! - [`sync`]: Scanner, diff engine and applier (always included)
//! - [`client`]: Client API (requires `client` feature)
//! - [`server`]: Server API (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::UNIX_EPOCH;
//! use treesync::sync::{apply, diff, Snapshot};
//!
//! let sender = tempfile::tempdir().unwrap();
//! let receiver = tempfile::tempdir().unwrap();
//! std::fs::write(sender.path().join("a.txt"), "hi").unwrap();
//!
//! let first = diff(sender.path(), &Snapshot::new(), UNIX_EPOCH).unwrap();
//! let report = apply(receiver.path(), &first.changes).unwrap();
//!
//! assert!(report.is_clean());
//! assert_eq!(std::fs::read(receiver.path().join("a.txt")).unwrap(), b"hi");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Connection manager
pub mod transport;

// Request/response correlation
pub mod rpc;

// Directory scanning, diffing and application
pub mod sync;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::rpc::{
        EchoPayload, Envelope, FailedEntry, FileChange, FileWatchRequest, FileWatchResponse,
        RequestType, RpcChannel, RpcError,
    };
    pub use crate::sync::{
        apply, diff, diff_with_retry, scan, ApplyReport, ChangeEntry, ChangeSet, Diff, FileRecord,
        Snapshot,
    };
    pub use crate::transport::{
        CloseKind, ConnectOptions, Connection, ConnectionPhase, TransportError, TransportResult,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{
        ClientConfig, ClientError, FileWatcher, SyncClient, SyncClientBuilder, SyncOutcome,
    };

    #[cfg(feature = "server")]
    pub use crate::server::{ServerConfig, ServerError, SyncServer, SyncServerBuilder};
}

// Re-export commonly used items at crate root
pub use crate::core::{SyncError, TreeSyncError};
pub use crate::rpc::{RequestType, RpcError};
pub use crate::sync::{ChangeEntry, ChangeSet, Snapshot};
pub use crate::transport::{ConnectionPhase, TransportError};

#[cfg(feature = "client")]
pub use crate::client::{SyncClient, SyncClientBuilder};

#[cfg(feature = "server")]
pub use crate::server::{SyncServer, SyncServerBuilder};
