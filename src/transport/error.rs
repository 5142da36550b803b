//! Transport layer error types.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Every handshake attempt failed.
    #[error("connection failed after {attempts} attempts: {reason}")]
    ConnectFailed {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        reason: String,
    },

    /// The connection is not established (never opened, closing or closed).
    #[error("not connected")]
    NotConnected,

    /// WebSocket protocol or socket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// I/O error (listener and socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Check if this error ends the session.
    ///
    /// A fatal error means a fresh `connect()` is required before any
    /// further request can succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::ConnectFailed { .. } | TransportError::NotConnected => true,
            TransportError::WebSocket(e) => matches!(
                e,
                tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Io(_)
                    | tungstenite::Error::Protocol(_)
            ),
            TransportError::Io(_) => true,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
