// ============================================================================
// Cloud Service
// ============================================================================
//
// Cloud endpoint of the bridge. Handles:
// - Client registration (checked by the auth backend over the bus)
// - Certificate rotation
// - Message queue push/pull over REST and WebSocket
//
// Every registered client gets a queue-grouped subscription on
// `bridge.client.<id>.>`, so several instances can share the load.
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_config::Config;
use bridge_shared::backends::{connect_bus, open_storage};
use bridge_shared::cloud::{self, ensure_cloud_identity};
use bridge_shared::context::AppContext;
use bridge_shared::routes::create_router;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing
    bridge_shared::init_tracing(&config.logging);

    info!("=== Cloud Service Starting ===");
    info!("Cloud ID: {}", config.cloud_id);

    // Bus and storage
    let bus = connect_bus(&config.bus).await?;
    let storage = open_storage(&config.storage, &config.bus).await?;
    info!("Backends ready");

    ensure_cloud_identity(
        storage.key_store.as_ref(),
        &config.cloud_id,
        config.security.key_bits,
    )
    .await
    .context("Failed to load cloud identity")?;

    let context = Arc::new(AppContext::new(
        config.clone(),
        bus,
        storage.key_store,
        storage.cache,
    ));

    let cancel = CancellationToken::new();
    let tasks = cloud::start(&context, cancel.clone()).await?;

    let app = create_router(context);

    info!("Cloud Service listening on {}", config.server.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(bridge_shared::shutdown_signal())
        .await
        .context("Failed to start server")?;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("Cloud Service stopped");

    Ok(())
}
