//! WebSocket connection wrapper.
//!
//! [`Connection`] owns one physical WebSocket. It is created either by
//! dialing a URL with bounded retry ([`Connection::connect`]) or by wrapping
//! an already-accepted stream ([`Connection::from_stream`]). Either way a
//! single receive task is spawned that feeds a [`FrameHandler`] until the
//! socket closes.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::connection::{close_frame, websocket_config, CloseKind, ConnectionPhase, FrameHandler};
use super::error::{TransportError, TransportResult};
use crate::core::{
    CONNECT_RETRY_DELAY, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SERVER_URL, MAX_CONNECTION_ATTEMPTS,
};

type FrameSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// Dial parameters for [`Connection::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// WebSocket URL (`ws://host:port/`).
    pub url: String,
    /// Handshake attempts before giving up.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Largest message accepted from the peer (`None` for no limit).
    pub max_message_size: Option<usize>,
}

impl ConnectOptions {
    /// Options for `url` with the default retry bound.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            max_attempts: MAX_CONNECTION_ATTEMPTS,
            retry_delay: CONNECT_RETRY_DELAY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// One established WebSocket session.
///
/// Sending goes through [`Connection::send`]; receiving is done by the
/// background task, which hands every text frame to the [`FrameHandler`]
/// supplied at construction.
pub struct Connection {
    /// Remote peer (URL when dialed, socket address when accepted).
    peer: String,
    /// Write half.
    sink: Mutex<FrameSink>,
    /// Shared with the receive task.
    phase: Arc<RwLock<ConnectionPhase>>,
    /// The receive task.
    receiver: JoinHandle<()>,
}

impl Connection {
    /// Dial `options.url`, retrying up to `options.max_attempts` times.
    ///
    /// Fails with [`TransportError::ConnectFailed`] when every attempt fails.
    pub async fn connect(
        options: &ConnectOptions,
        handler: Arc<dyn FrameHandler>,
    ) -> TransportResult<Self> {
        let attempts = options.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");
        let config = websocket_config(options.max_message_size);

        for attempt in 1..=attempts {
            debug!(attempt, url = %options.url, "connection attempt");

            let handshake = tokio_tungstenite::connect_async_with_config(
                options.url.as_str(),
                Some(config),
                false,
            );
            match handshake.await {
                Ok((stream, _response)) => {
                    info!(attempt, url = %options.url, "connected");
                    return Ok(Self::from_stream(stream, options.url.clone(), handler));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts && !options.retry_delay.is_zero() {
                        tokio::time::sleep(options.retry_delay).await;
                    }
                }
            }
        }

        warn!(attempts, url = %options.url, error = %last_error, "giving up on connection");
        Err(TransportError::ConnectFailed {
            attempts,
            reason: last_error,
        })
    }

    /// Wrap an established WebSocket and start its receive task.
    pub fn from_stream<S>(
        stream: WebSocketStream<S>,
        peer: impl Into<String>,
        handler: Arc<dyn FrameHandler>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = peer.into();
        let (sink, stream) = stream.split();
        let phase = Arc::new(RwLock::new(ConnectionPhase::Established));

        let receiver = tokio::spawn(receive_loop(
            Box::pin(stream),
            handler,
            phase.clone(),
            peer.clone(),
        ));

        Self {
            peer,
            sink: Mutex::new(Box::pin(sink)),
            phase,
            receiver,
        }
    }

    /// Write one text frame.
    ///
    /// Fails with [`TransportError::NotConnected`] unless the connection is
    /// established.
    pub async fn send(&self, text: String) -> TransportResult<()> {
        if !self.phase.read().await.can_send() {
            return Err(TransportError::NotConnected);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Send a normal-closure frame.
    ///
    /// The receive task finishes once the peer answers the close handshake.
    pub async fn close(&self) -> TransportResult<()> {
        self.close_with(CloseCode::Normal, "").await
    }

    /// Send a close frame with an explicit code and reason.
    pub async fn close_with(&self, code: CloseCode, reason: &'static str) -> TransportResult<()> {
        {
            let mut phase = self.phase.write().await;
            if !phase.can_send() {
                return Ok(());
            }
            *phase = ConnectionPhase::Closing;
        }

        let mut sink = self.sink.lock().await;
        match sink.send(Message::Close(Some(close_frame(code, reason)))).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> ConnectionPhase {
        *self.phase.read().await
    }

    /// Whether frames can currently be sent.
    pub async fn is_established(&self) -> bool {
        self.phase.read().await.can_send()
    }

    /// Remote peer description.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the receive task has finished.
    pub fn is_finished(&self) -> bool {
        self.receiver.is_finished()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("receiver_finished", &self.receiver.is_finished())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Read frames until the socket closes, then report how it ended.
async fn receive_loop(
    mut stream: FrameStream,
    handler: Arc<dyn FrameHandler>,
    phase: Arc<RwLock<ConnectionPhase>>,
    peer: String,
) {
    // A close frame is remembered and the loop keeps reading so tungstenite
    // can complete the closing handshake.
    let mut closed: Option<CloseKind> = None;

    let kind = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => handler.on_frame(text),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => handler.on_frame(text),
                Err(_) => warn!(peer = %peer, "dropping non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                closed = Some(CloseKind::from_close_frame(frame.as_ref()));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break closed.unwrap_or_else(|| CloseKind::from_error(&e)),
            None => break closed.unwrap_or_else(|| CloseKind::from_close_frame(None)),
        }
    };

    *phase.write().await = if kind.is_expected() {
        ConnectionPhase::Closed
    } else {
        ConnectionPhase::Failed
    };

    if kind.is_expected() {
        debug!(peer = %peer, %kind, "connection ended");
    } else {
        warn!(peer = %peer, %kind, "connection ended unexpectedly");
    }

    handler.on_close(&kind);
}
