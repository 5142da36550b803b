//! Connection lifecycle and close classification.
//!
//! A session ends either *expectedly* (normal closure, going-away, no status,
//! abnormal drop) or *unexpectedly* (any other close code or a transport
//! error). Expected endings are quiet; unexpected ones are surfaced to every
//! caller still waiting on a response.

use std::borrow::Cow;
use std::fmt;
use std::io;

use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};

use crate::core::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, EXPECTED_CLOSE_CODES};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Handshake in progress.
    Connecting,
    /// Connection established, frames flow both ways.
    Established,
    /// Local side sent a close frame.
    Closing,
    /// Connection ended expectedly.
    Closed,
    /// Connection ended unexpectedly.
    Failed,
}

impl ConnectionPhase {
    /// Whether frames may be sent in this phase.
    pub fn can_send(&self) -> bool {
        *self == ConnectionPhase::Established
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// Normal, going-away, no-status or abnormal closure.
    Expected {
        /// Close code (RFC 6455), 1005 when the peer sent none.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// Any other close code, or a transport failure.
    Unexpected {
        /// Close code, if a close frame was received.
        code: Option<u16>,
        /// Human-readable cause.
        reason: String,
    },
}

impl CloseKind {
    /// Whether the session ended quietly.
    pub fn is_expected(&self) -> bool {
        matches!(self, CloseKind::Expected { .. })
    }

    /// The close code, if known.
    pub fn code(&self) -> Option<u16> {
        match self {
            CloseKind::Expected { code, .. } => Some(*code),
            CloseKind::Unexpected { code, .. } => *code,
        }
    }

    /// Classify a received close frame (or its absence).
    pub fn from_close_frame(frame: Option<&CloseFrame<'_>>) -> Self {
        let Some(frame) = frame else {
            return CloseKind::Expected {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            };
        };

        let code = u16::from(frame.code);
        let reason = frame.reason.to_string();
        if EXPECTED_CLOSE_CODES.contains(&code) {
            CloseKind::Expected { code, reason }
        } else {
            CloseKind::Unexpected {
                code: Some(code),
                reason,
            }
        }
    }

    /// Classify a receive error.
    ///
    /// A dropped TCP stream without a closing handshake is an abnormal
    /// closure (1006) and counts as expected.
    pub fn from_error(err: &tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                CloseKind::Expected {
                    code: CLOSE_NO_STATUS,
                    reason: String::new(),
                }
            }
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                CloseKind::abnormal(err.to_string())
            }
            tungstenite::Error::Io(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe
                ) =>
            {
                CloseKind::abnormal(e.to_string())
            }
            other => CloseKind::Unexpected {
                code: None,
                reason: other.to_string(),
            },
        }
    }

    fn abnormal(reason: String) -> Self {
        CloseKind::Expected {
            code: CLOSE_ABNORMAL,
            reason,
        }
    }
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseKind::Expected { code, reason } if reason.is_empty() => {
                write!(f, "closed ({code})")
            }
            CloseKind::Expected { code, reason } => write!(f, "closed ({code}): {reason}"),
            CloseKind::Unexpected {
                code: Some(code),
                reason,
            } => write!(f, "unexpected close ({code}): {reason}"),
            CloseKind::Unexpected { code: None, reason } => {
                write!(f, "connection lost: {reason}")
            }
        }
    }
}

/// Build a close frame with the given code and reason.
pub fn close_frame(code: CloseCode, reason: impl Into<Cow<'static, str>>) -> CloseFrame<'static> {
    CloseFrame {
        code,
        reason: reason.into(),
    }
}

/// WebSocket settings with both the message and the frame limit set to
/// `max_message_size` (`None` lifts them).
pub fn websocket_config(max_message_size: Option<usize>) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = max_message_size;
    config.max_frame_size = max_message_size;
    config
}

/// Receiver of inbound traffic from a connection's receive loop.
///
/// The receive loop calls `on_frame` once per text frame, in arrival order,
/// and `on_close` exactly once when the loop ends. Both are called from the
/// receive task, so implementations must not block.
pub trait FrameHandler: Send + Sync + 'static {
    /// A text frame arrived.
    fn on_frame(&self, frame: String);

    /// The session ended.
    fn on_close(&self, kind: &CloseKind);
}
