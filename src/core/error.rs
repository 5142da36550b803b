//! Error types for treesync.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::rpc::RpcError;
use crate::transport::TransportError;

/// Errors from scanning, diffing and applying directory trees.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The walk could not be completed.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// The sync root exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A read, write, remove or mkdir failed.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A relative path is empty, absolute, or escapes the root.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// Upsert content is not valid base64.
    #[error("invalid content for {path}: {source}")]
    InvalidContent {
        /// Relative path of the entry.
        path: String,
        /// Decoder error.
        #[source]
        source: base64::DecodeError,
    },

    /// A non-delete entry arrived without content.
    #[error("missing content for {0}")]
    MissingContent(String),

    /// A change-set already holds an entry for this path.
    #[error("duplicate entry for {0}")]
    DuplicatePath(String),
}

impl SyncError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Top-level treesync errors.
#[derive(Debug, Error)]
pub enum TreeSyncError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// RPC error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_names_path() {
        let err = SyncError::filesystem(
            "/srv/tree/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/srv/tree/a.txt"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_top_level_conversion() {
        let err: TreeSyncError = SyncError::MissingContent("a.txt".into()).into();
        assert!(matches!(err, TreeSyncError::Sync(SyncError::MissingContent(_))));
    }
}
