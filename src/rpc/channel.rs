//! Request/response over one connection.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::correlator::Correlator;
use super::error::RpcError;
use super::message::{Envelope, RequestType};
use crate::core::{RequestIdGenerator, UuidGenerator, REQUEST_TIMEOUT};
use crate::transport::{ConnectOptions, Connection, ConnectionPhase, TransportResult};

/// Removes a pending entry when the issuing future finishes or is dropped.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // No-op once the response was delivered.
        self.correlator.cancel(self.request_id);
    }
}

/// A client-side session: one connection plus the correlator routing its
/// responses.
///
/// `issue` may be called concurrently from any number of tasks.
pub struct RpcChannel {
    connection: Connection,
    correlator: Arc<Correlator>,
    ids: Arc<dyn RequestIdGenerator>,
    timeout: Duration,
}

impl RpcChannel {
    /// Connect to `options.url` with UUID request identifiers and the
    /// default deadline.
    pub async fn open(options: &ConnectOptions) -> TransportResult<Self> {
        Self::open_with(options, Arc::new(UuidGenerator), REQUEST_TIMEOUT).await
    }

    /// Connect with an explicit identifier source and per-request deadline.
    pub async fn open_with(
        options: &ConnectOptions,
        ids: Arc<dyn RequestIdGenerator>,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let correlator = Correlator::new();
        let connection = Connection::connect(options, correlator.clone()).await?;
        Ok(Self {
            connection,
            correlator,
            ids,
            timeout,
        })
    }

    /// Send `payload` as a `request_type` request and wait for its response
    /// under the channel's default deadline.
    pub async fn issue<Req, Resp>(
        &self,
        request_type: RequestType,
        payload: Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.issue_with_timeout(request_type, payload, self.timeout)
            .await
    }

    /// Like [`issue`](Self::issue) with an explicit deadline.
    ///
    /// On expiry the pending entry is removed and only this call fails; a
    /// late response for it is dropped by the correlator.
    pub async fn issue_with_timeout<Req, Resp>(
        &self,
        request_type: RequestType,
        payload: Req,
        timeout: Duration,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let request_id = self.ids.next_id();
        let frame = Envelope::new(request_id.clone(), request_type, payload)
            .encode()
            .map_err(RpcError::Serialize)?;

        let rx = self.correlator.register(&request_id)?;
        let _guard = PendingGuard {
            correlator: &self.correlator,
            request_id: &request_id,
        };

        self.connection.send(frame).await?;
        debug!(request_id = %request_id, %request_type, "request sent");

        let delivery = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(delivery)) => delivery,
            // Sender dropped without a delivery: the table was torn down.
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                warn!(request_id = %request_id, %request_type, ?timeout, "request timed out");
                Err(RpcError::Timeout(timeout))
            }
        };
        let frame = delivery?;

        let response = Envelope::<Resp>::decode(&frame).map_err(RpcError::Decode)?;
        if response.request_type != request_type {
            return Err(RpcError::RequestTypeMismatch {
                expected: request_type,
                actual: response.request_type,
            });
        }
        Ok(response.payload)
    }

    /// Send a normal-closure frame.
    pub async fn close(&self) -> TransportResult<()> {
        self.connection.close().await
    }

    /// Current connection phase.
    pub async fn phase(&self) -> ConnectionPhase {
        self.connection.phase().await
    }

    /// Whether requests can still be sent.
    pub async fn is_open(&self) -> bool {
        self.connection.is_established().await && !self.correlator.is_shut_down()
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.correlator.in_flight()
    }

    /// Server URL this channel is connected to.
    pub fn peer(&self) -> &str {
        self.connection.peer()
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("connection", &self.connection)
            .field("in_flight", &self.correlator.in_flight())
            .field("timeout", &self.timeout)
            .finish()
    }
}
