// ============================================================================
// Prem Agent
// ============================================================================
//
// On-prem side of the bridge. Registers with the cloud on first start, then
// relays local bus traffic to the cloud and cloud traffic back onto the
// local bus over the transport chosen by BRIDGE_TRANSPORT.
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_config::Config;
use bridge_shared::backends::{connect_bus, open_storage};
use bridge_shared::relay::{build_transport, ensure_registered, RelayContext};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    bridge_shared::init_tracing(&config.logging);

    info!("=== Prem Agent Starting ===");
    info!("Cloud: {}", config.relay.server_url);

    let bus = connect_bus(&config.bus).await?;
    let storage = open_storage(&config.storage, &config.bus).await?;

    let context = RelayContext::new(config.clone(), bus, storage.key_store)
        .context("Failed to build relay context")?;
    let location_id = ensure_registered(&context).await?;

    let transport = build_transport(context);
    transport
        .start_message_handler(&location_id)
        .await
        .context("Failed to start relay")?;

    bridge_shared::shutdown_signal().await;

    transport
        .stop_message_handler()
        .await
        .context("Failed to stop relay")?;
    info!("Prem Agent stopped");

    Ok(())
}
