// ============================================================================
// Cloud Side
// ============================================================================
//
// - ingest.rs:   inbound bridged messages from clients onto the cloud bus
// - outbound.rs: client subscription traffic sealed for delivery
// - janitor.rs:  cache cleanup on client removal
//
// `ensure_cloud_identity` and `start` run once at service startup.
// ============================================================================

mod ingest;
mod janitor;
mod outbound;

pub use ingest::{ingest, IngestError};
pub use janitor::spawn_cache_janitor;
pub use outbound::{pull_messages, seal_for_client};

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_crypto::KeyPair;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::keystore::{KeyRecord, KeyStore};

/// Load the cloud keypair, generating and storing one on first start.
pub async fn ensure_cloud_identity(
    key_store: &dyn KeyStore,
    cloud_id: &str,
    key_bits: usize,
) -> Result<KeyRecord> {
    if let Some(record) = key_store.get(cloud_id).await? {
        match record.keypair() {
            Some(Ok(_)) => {
                tracing::info!(cloud_id = %cloud_id, "Loaded cloud identity");
                return Ok(record);
            }
            Some(Err(e)) => return Err(e).context("stored cloud private key is unreadable"),
            None => anyhow::bail!("key store entry {:?} has no private key", cloud_id),
        }
    }

    tracing::info!(cloud_id = %cloud_id, key_bits, "Generating cloud identity");
    let pair = tokio::task::spawn_blocking(move || KeyPair::generate(key_bits))
        .await
        .context("key generation task failed")??;
    let record = KeyRecord::from_keypair(&pair)?;
    key_store.put(cloud_id, &record).await?;
    Ok(record)
}

/// Start background tasks: subscription lifecycle listeners and the cache
/// janitor.
pub async fn start(ctx: &Arc<AppContext>, cancel: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
    let mut tasks = ctx
        .subscriptions
        .start(cancel.clone())
        .await
        .context("failed to start subscription manager")?;
    tasks.push(spawn_cache_janitor(ctx.clone(), cancel).await?);
    Ok(tasks)
}
