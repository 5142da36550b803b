//! Server session management.
//!
//! Handles per-client session state including:
//! - Session ID management
//! - Activity tracking
//! - Session lifecycle
//! - Hand-off of inbound frames from the receive task to the session task

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::transport::{CloseKind, FrameHandler};

/// Session ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerSessionId(Uuid);

impl ServerSessionId {
    /// Generate a random session ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ServerSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The first group is enough to tell sessions apart in logs.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

impl From<Uuid> for ServerSessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// WebSocket handshake in progress.
    Handshaking,
    /// Session is active and serving requests.
    Active,
    /// Server sent a close frame.
    Closing,
}

/// Per-client session.
#[derive(Debug, Clone)]
pub struct ServerSession {
    /// Session ID.
    id: ServerSessionId,

    /// Client's address.
    peer_addr: SocketAddr,

    /// Session state.
    state: SessionState,

    /// Requests answered so far.
    requests_handled: u64,

    /// Last activity time.
    last_activity: Instant,

    /// Created time.
    created_at: Instant,
}

impl ServerSession {
    /// Create a new session.
    pub fn new(id: ServerSessionId, peer_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            peer_addr,
            state: SessionState::Handshaking,
            requests_handled: 0,
            last_activity: now,
            created_at: now,
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> ServerSessionId {
        self.id
    }

    /// Get the client address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Set the session state.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Record a handled request.
    pub fn record_request(&mut self) {
        self.requests_handled += 1;
        self.touch();
    }

    /// Number of requests handled.
    pub fn requests_handled(&self) -> u64 {
        self.requests_handled
    }

    /// Record activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Get time since last activity.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Get session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Check if session is active.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// What the receive task hands to the session task.
#[derive(Debug)]
pub enum Inbound {
    /// A text frame.
    Frame(String),
    /// The connection ended.
    Closed(CloseKind),
}

/// [`FrameHandler`] that queues inbound traffic for the session task.
///
/// Requests are dispatched off the receive task so a slow apply never
/// stalls reading.
#[derive(Debug)]
pub struct SessionInbox {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl SessionInbox {
    /// Create an inbox and the receiver the session task reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrameHandler for SessionInbox {
    fn on_frame(&self, frame: String) {
        // The session task is gone only after the connection is dropped.
        let _ = self.tx.send(Inbound::Frame(frame));
    }

    fn on_close(&self, kind: &CloseKind) {
        let _ = self.tx.send(Inbound::Closed(kind.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_session_id_generate() {
        let id1 = ServerSessionId::generate();
        let id2 = ServerSessionId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_display() {
        let id = ServerSessionId::generate();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = ServerSession::new(ServerSessionId::generate(), addr());
        assert_eq!(session.state(), SessionState::Handshaking);
        assert!(!session.is_active());

        session.set_state(SessionState::Active);
        session.record_request();
        session.record_request();
        assert!(session.is_active());
        assert_eq!(session.requests_handled(), 2);
        assert_eq!(session.peer_addr(), addr());
    }

    #[tokio::test]
    async fn test_inbox_forwards_in_order() {
        let (inbox, mut rx) = SessionInbox::new();
        inbox.on_frame("one".into());
        inbox.on_frame("two".into());
        inbox.on_close(&CloseKind::Expected {
            code: 1000,
            reason: String::new(),
        });

        assert!(matches!(rx.recv().await, Some(Inbound::Frame(f)) if f == "one"));
        assert!(matches!(rx.recv().await, Some(Inbound::Frame(f)) if f == "two"));
        assert!(matches!(rx.recv().await, Some(Inbound::Closed(k)) if k.is_expected()));
    }
}
