//! High-level treesync server API.
//!
//! Provides `SyncServer` for accepting WebSocket clients and applying the
//! change-sets they send to a local root.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::session::{Inbound, ServerSession, ServerSessionId, SessionInbox, SessionState};
use crate::core::{DEFAULT_BIND_ADDR, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_SESSIONS};
use crate::transport::{close_frame, websocket_config, Connection};

/// How long a session waits for the peer to answer a server-initiated close.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Errors that can occur in the treesync server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("bind failed: {0}")]
    BindFailed(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// Directory that file-watch requests are applied to.
    pub root: PathBuf,

    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// Close sessions idle for this long (`None` keeps them open).
    pub session_timeout: Option<Duration>,

    /// Largest request accepted from a client (`None` for no limit).
    pub max_message_size: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 5555))),
            root: PathBuf::from("."),
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Builder for creating a `ServerConfig`.
#[derive(Debug)]
pub struct SyncServerBuilder {
    config: ServerConfig,
}

impl SyncServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the sync root.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    /// Set the maximum number of concurrent sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Set the idle timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = Some(timeout);
        self
    }

    /// Cap the size of inbound requests.
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.config.max_message_size = Some(bytes);
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for SyncServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

type Sessions = Arc<RwLock<HashMap<ServerSessionId, ServerSession>>>;

/// A treesync server.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use treesync::server::{SyncServer, SyncServerBuilder};
///
/// let config = SyncServerBuilder::new()
///     .bind_addr("0.0.0.0:5555".parse()?)
///     .root("/srv/mirror")
///     .build();
///
/// let server = Arc::new(SyncServer::bind(config).await?);
/// let runner = server.clone();
/// tokio::spawn(async move { runner.run().await });
///
/// // ...
/// server.shutdown();
/// ```
pub struct SyncServer {
    /// Server configuration.
    config: ServerConfig,

    /// Accepting socket.
    listener: TcpListener,

    /// Bound address.
    local_addr: SocketAddr,

    /// Request handlers.
    dispatcher: Arc<Dispatcher>,

    /// Active sessions.
    sessions: Sessions,

    /// Shutdown signal, observed by the accept loop and every session.
    shutdown_tx: watch::Sender<bool>,
}

impl SyncServer {
    /// Bind to the configured address.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        if config.max_sessions == 0 {
            return Err(ServerError::Config("max_sessions must be at least 1".into()));
        }

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::BindFailed(format!("{}: {}", config.bind_addr, e)))?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        info!(addr = %local_addr, root = %config.root.display(), "server listening");

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(config.root.clone())),
            config,
            listener,
            local_addr,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        })
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((tcp, peer)) => self.admit(tcp, peer).await,
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        info!(addr = %self.local_addr, "server stopped accepting");
        Ok(())
    }

    /// Start a session for an accepted socket, or turn it away if the
    /// session limit is reached.
    async fn admit(&self, tcp: TcpStream, peer: SocketAddr) {
        let id = ServerSessionId::generate();
        {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= self.config.max_sessions {
                warn!(%peer, limit = self.config.max_sessions, "session limit reached, rejecting");
                tokio::spawn(reject(tcp, peer));
                return;
            }
            sessions.insert(id, ServerSession::new(id, peer));
        }

        tokio::spawn(serve_session(
            tcp,
            peer,
            id,
            self.dispatcher.clone(),
            self.sessions.clone(),
            self.shutdown_tx.subscribe(),
            self.config.session_timeout,
            self.config.max_message_size,
        ));
    }

    /// Stop accepting and close every session with a going-away frame.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the number of active sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Snapshot of the current sessions.
    pub async fn sessions(&self) -> Vec<ServerSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for SyncServer {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Complete the handshake only to send a policy-violation close.
async fn reject(tcp: TcpStream, peer: SocketAddr) {
    match tokio_tungstenite::accept_async(tcp).await {
        Ok(mut ws) => {
            let frame = close_frame(CloseCode::Policy, "session limit reached");
            if let Err(e) = ws.close(Some(frame)).await {
                debug!(%peer, error = %e, "rejected peer went away");
            }
        }
        Err(e) => debug!(%peer, error = %e, "handshake with rejected peer failed"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn serve_session(
    tcp: TcpStream,
    peer: SocketAddr,
    id: ServerSessionId,
    dispatcher: Arc<Dispatcher>,
    sessions: Sessions,
    mut shutdown: watch::Receiver<bool>,
    idle_timeout: Option<Duration>,
    max_message_size: Option<usize>,
) {
    let config = websocket_config(max_message_size);
    let ws = match tokio_tungstenite::accept_async_with_config(tcp, Some(config)).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(session = %id, %peer, error = %e, "websocket handshake failed");
            sessions.write().await.remove(&id);
            return;
        }
    };

    let (inbox, mut inbound) = SessionInbox::new();
    let conn = Connection::from_stream(ws, peer.to_string(), Arc::new(inbox));
    set_state(&sessions, id, SessionState::Active).await;
    info!(session = %id, %peer, "session opened");

    let mut closing = false;
    loop {
        let wait = match (closing, idle_timeout) {
            (true, _) => Some(CLOSE_GRACE),
            (false, timeout) => timeout,
        };

        tokio::select! {
            changed = shutdown.changed(), if !closing => {
                if changed.is_err() || *shutdown.borrow() {
                    closing = start_close(&conn, &sessions, id, CloseCode::Away, "server shutting down").await;
                }
            }
            event = inbound.recv() => match event {
                Some(Inbound::Frame(frame)) => {
                    if let Some(session) = sessions.write().await.get_mut(&id) {
                        session.touch();
                    }
                    if let Some(response) = dispatcher.handle(&frame).await {
                        match conn.send(response).await {
                            Ok(()) => {
                                if let Some(session) = sessions.write().await.get_mut(&id) {
                                    session.record_request();
                                }
                            }
                            Err(e) => warn!(session = %id, error = %e, "failed to send response"),
                        }
                    }
                }
                Some(Inbound::Closed(kind)) => {
                    debug!(session = %id, %kind, "peer closed session");
                    break;
                }
                None => break,
            },
            _ = sleep_or_forever(wait) => {
                if closing {
                    debug!(session = %id, "peer did not answer close, dropping");
                    break;
                }
                closing = start_close(&conn, &sessions, id, CloseCode::Away, "idle timeout").await;
            }
        }
    }

    sessions.write().await.remove(&id);
    info!(session = %id, %peer, "session closed");
}

async fn start_close(
    conn: &Connection,
    sessions: &Sessions,
    id: ServerSessionId,
    code: CloseCode,
    reason: &'static str,
) -> bool {
    set_state(sessions, id, SessionState::Closing).await;
    if let Err(e) = conn.close_with(code, reason).await {
        debug!(session = %id, error = %e, "close frame not sent");
    }
    true
}

async fn set_state(sessions: &Sessions, id: ServerSessionId, state: SessionState) {
    if let Some(session) = sessions.write().await.get_mut(&id) {
        session.set_state(state);
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
