// ============================================================================
// Cache Janitor
// ============================================================================
//
// Listens on `<lifecycle_prefix>.client.removed` and clears the removed
// client's cached messages. An `account.removed` reaches here too, since the
// subscription manager republishes it as `client.removed`.
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use bridge_types::LifecycleEvent;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

const WAKEUP: Duration = Duration::from_secs(5);

/// Clear a client's cached messages once it is removed.
pub async fn spawn_cache_janitor(
    ctx: Arc<AppContext>,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let removed = ctx.bus.subscribe(&ctx.config.subjects.client_removed()).await?;

    Ok(tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = removed.next_message(WAKEUP) => next,
            };
            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Cache janitor stopped");
                    break;
                }
            };
            let Ok(event) = serde_json::from_slice::<LifecycleEvent>(&message.data) else {
                continue;
            };
            match ctx.cache.clear(&event.location_id).await {
                Ok(()) => tracing::info!(location_id = %event.location_id, "Cleared cached messages"),
                Err(e) => tracing::warn!(location_id = %event.location_id, error = %e, "Failed to clear cache"),
            }
        }
    }))
}
