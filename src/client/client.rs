//! High-level treesync client API.
//!
//! Provides `SyncClient` for connecting to a treesync server, checking
//! connectivity with echo requests and shipping change-sets.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::core::{
    RequestIdGenerator, SyncError, UuidGenerator, CONNECT_RETRY_DELAY, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_SERVER_URL, MAX_CONNECTION_ATTEMPTS, REQUEST_TIMEOUT,
};
use crate::rpc::{
    EchoPayload, FileWatchRequest, FileWatchResponse, RequestType, RpcChannel, RpcError,
};
use crate::sync::ChangeSet;
use crate::transport::{ConnectOptions, ConnectionPhase, TransportError};

/// Errors that can occur in the treesync client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to connect to the server.
    #[error("connection failed: {0}")]
    ConnectionFailed(#[from] TransportError),

    /// A request failed.
    #[error("request failed: {0}")]
    Rpc(#[from] RpcError),

    /// Scanning or diffing the local tree failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A blocking filesystem task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// Whether the session is gone and the caller should reconnect.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            ClientError::ConnectionFailed(_) => true,
            ClientError::Rpc(e) => e.is_connection_failure(),
            ClientError::Sync(_) | ClientError::Task(_) => false,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub server_url: String,

    /// Handshake attempts before `connect` gives up.
    pub max_connect_attempts: u32,

    /// Pause between handshake attempts.
    pub connect_retry_delay: Duration,

    /// Deadline for each request.
    pub request_timeout: Duration,

    /// Largest response accepted from the server (`None` for no limit).
    pub max_message_size: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_connect_attempts: MAX_CONNECTION_ATTEMPTS,
            connect_retry_delay: CONNECT_RETRY_DELAY,
            request_timeout: REQUEST_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.server_url.clone(),
            max_attempts: self.max_connect_attempts,
            retry_delay: self.connect_retry_delay,
            max_message_size: self.max_message_size,
        }
    }
}

/// Builder for creating a `ClientConfig`.
#[derive(Debug)]
pub struct SyncClientBuilder {
    config: ClientConfig,
}

impl SyncClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the server URL.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Set the number of handshake attempts.
    pub fn max_connect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_connect_attempts = attempts;
        self
    }

    /// Set the pause between handshake attempts.
    pub fn connect_retry_delay(mut self, delay: Duration) -> Self {
        self.config.connect_retry_delay = delay;
        self
    }

    /// Set the per-request deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Cap the size of inbound messages.
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.config.max_message_size = Some(bytes);
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for SyncClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A treesync client session.
///
/// Requests may be issued concurrently; each waits for its own response.
///
/// # Example
///
/// ```ignore
/// use treesync::client::{SyncClient, SyncClientBuilder};
///
/// let config = SyncClientBuilder::new()
///     .server_url("ws://localhost:5555/")
///     .build();
///
/// let client = SyncClient::connect(config).await?;
/// assert_eq!(client.echo("hello there").await?, "hello there");
/// ```
#[derive(Debug)]
pub struct SyncClient {
    channel: RpcChannel,
    config: ClientConfig,
}

impl SyncClient {
    /// Connect to the server named in `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        Self::connect_with_ids(config, Arc::new(UuidGenerator)).await
    }

    /// Connect using a custom request identifier source.
    pub async fn connect_with_ids(
        config: ClientConfig,
        ids: Arc<dyn RequestIdGenerator>,
    ) -> Result<Self, ClientError> {
        let channel =
            RpcChannel::open_with(&config.connect_options(), ids, config.request_timeout).await?;
        info!(url = %config.server_url, "client connected");
        Ok(Self { channel, config })
    }

    /// Send `value` and return what the server echoed back.
    pub async fn echo(&self, value: impl Into<String>) -> Result<String, ClientError> {
        let response: EchoPayload = self
            .channel
            .issue(RequestType::Echo, EchoPayload { value: value.into() })
            .await?;
        Ok(response.value)
    }

    /// Ship a change-set and wait for the server's acknowledgement.
    pub async fn file_watch(&self, changes: &ChangeSet) -> Result<FileWatchResponse, ClientError> {
        let request = FileWatchRequest {
            files: changes.to_wire(),
        };
        let response: FileWatchResponse = self
            .channel
            .issue(RequestType::FileWatch, request)
            .await?;

        debug!(
            entries = changes.len(),
            failed = response.failed.len(),
            "file watch acknowledged"
        );
        Ok(response)
    }

    /// Close the session with a normal-closure frame.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.channel.close().await?;
        Ok(())
    }

    /// Current connection phase.
    pub async fn phase(&self) -> ConnectionPhase {
        self.channel.phase().await
    }

    /// Whether requests can still be sent.
    pub async fn is_connected(&self) -> bool {
        self.channel.is_open().await
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.channel.in_flight()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
