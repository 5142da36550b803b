//! RPC layer error types.

use std::time::Duration;

use thiserror::Error;

use super::message::RequestType;
use crate::transport::TransportError;

/// Errors from a single `issue` call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The connection dropped unexpectedly while the request was in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The connection closed normally while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response arrived before the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The request could not be encoded.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The response carried a different request type than the request.
    #[error("response type mismatch: expected {expected}, got {actual}")]
    RequestTypeMismatch {
        /// Type of the request that was sent.
        expected: RequestType,
        /// Type found in the response.
        actual: RequestType,
    },

    /// An identifier was registered twice.
    #[error("request id already in flight: {0}")]
    DuplicateRequestId(String),

    /// Sending the request failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl RpcError {
    /// Check if the session is gone and a reconnect is required.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            RpcError::ConnectionLost(_) | RpcError::ConnectionClosed => true,
            RpcError::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }
}
