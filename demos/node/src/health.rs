//! Health check endpoint.
//!
//! Serves `/health`, `/ready` and `/live` when `TREESYNC_HEALTH_ADDR` is set.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::sync::RwLock;
use tracing::info;

/// Health status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service mode (server or client).
    pub mode: String,
    /// Number of active sessions (server only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<usize>,
    /// Whether connected to server (client only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    /// Unix time (ms) of the last successful sync cycle (client only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_ms: Option<u64>,
}

/// Shared state for health endpoint.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<RwLock<HealthStatus>>,
}

impl HealthState {
    /// Create new health state for server mode.
    pub fn server() -> Self {
        Self::with(HealthStatus {
            healthy: true,
            mode: "server".to_string(),
            sessions: Some(0),
            connected: None,
            last_sync_ms: None,
        })
    }

    /// Create new health state for client mode.
    pub fn client() -> Self {
        Self::with(HealthStatus {
            healthy: true,
            mode: "client".to_string(),
            sessions: None,
            connected: Some(false),
            last_sync_ms: None,
        })
    }

    fn with(status: HealthStatus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(status)),
        }
    }

    /// Update session count (server mode).
    pub async fn set_sessions(&self, count: usize) {
        self.inner.write().await.sessions = Some(count);
    }

    /// Update connected status (client mode).
    pub async fn set_connected(&self, connected: bool) {
        self.inner.write().await.connected = Some(connected);
    }

    /// Record a completed sync cycle (client mode).
    pub async fn set_last_sync(&self, at: SystemTime) {
        let ms = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.inner.write().await.last_sync_ms = Some(ms);
    }

    /// Set healthy status (cleared while sync cycles keep failing).
    pub async fn set_healthy(&self, healthy: bool) {
        self.inner.write().await.healthy = healthy;
    }

    /// Get current status.
    pub async fn status(&self) -> HealthStatus {
        self.inner.read().await.clone()
    }
}

/// Health check handler.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.status().await;
    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Readiness handler: a client is ready once connected.
async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.status().await;
    let ready = status.healthy && status.connected.unwrap_or(true);
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Liveness handler (always returns OK if the process is running).
async fn live_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Build the health router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/live", get(live_handler))
        .with_state(state)
}

/// Start the health check server.
pub async fn start_health_server(
    bind_addr: SocketAddr,
    state: HealthState,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "health server listening");
    axum::serve(listener, router(state)).await
}
