//! Server mode.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;
use treesync::server::{ServerError, SyncServer, SyncServerBuilder};

use crate::config::NodeConfig;
use crate::health::HealthState;

/// How often the health endpoint's session count is refreshed.
const HEALTH_REFRESH: Duration = Duration::from_secs(1);

/// Serve until `shutdown` flips to `true`.
pub async fn run(
    config: &NodeConfig,
    health: Option<HealthState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    tokio::fs::create_dir_all(&config.root).await?;

    let server_config = SyncServerBuilder::new()
        .bind_addr(config.bind_addr)
        .root(config.root.clone())
        .build();
    let server = Arc::new(SyncServer::bind(server_config).await?);

    if let Some(health) = health {
        let server = server.clone();
        tokio::spawn(async move {
            let mut refresh = tokio::time::interval(HEALTH_REFRESH);
            loop {
                refresh.tick().await;
                health.set_sessions(server.session_count().await).await;
            }
        });
    }

    let stopper = server.clone();
    tokio::spawn(async move {
        let _ = shutdown.changed().await;
        info!("shutting down server");
        stopper.shutdown();
    });

    server.run().await
}
