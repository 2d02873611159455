// ============================================================================
// REST Relay Transport
// ============================================================================
//
// Two loops per started handler:
// - flush: batches from the outbound queue, sealed at flush time and POSTed
//   as one signed push. One push in flight at a time.
// - poll:  repeated long-polls, each inbound message republished locally.
//
// Both go through `with_rotation_retry`. Messages are re-sealed on the retry
// since the envelope signature must match the rotated key. A batch that
// still fails is dropped and logged.
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use bridge_types::BusMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    next_batch, with_rotation_retry, BatchPolicy, CertRotator, Lifecycle, RelayContext, RelayCore,
    RelayTransport, TransportError, OUTBOUND_CAPACITY,
};
use crate::retry::Backoff;

pub struct RestTransport {
    ctx: RelayContext,
    lifecycle: Lifecycle,
}

impl RestTransport {
    pub fn new(ctx: RelayContext) -> Self {
        Self {
            ctx,
            lifecycle: Lifecycle::default(),
        }
    }
}

#[async_trait]
impl RelayTransport for RestTransport {
    async fn start_message_handler(&self, client_id: &str) -> Result<(), TransportError> {
        let ctx = self.ctx.clone();
        self.lifecycle
            .start(|cancel| async move {
                let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
                let core = Arc::new(RelayCore::new(ctx.clone(), client_id, tx));
                let rotator = Arc::new(CertRotator::new(ctx.clone(), client_id));

                let mut tasks = core.spawn_pumps(cancel.clone()).await?;
                tasks.push(spawn_flush_loop(core.clone(), rotator.clone(), rx, cancel.clone()));
                tasks.push(spawn_poll_loop(core, rotator, cancel));

                tracing::info!(location_id = %client_id, transport = "rest", "Relay started");
                Ok(tasks)
            })
            .await
    }

    async fn stop_message_handler(&self) -> Result<(), TransportError> {
        self.lifecycle.stop().await?;
        tracing::info!(transport = "rest", "Relay stopped");
        Ok(())
    }
}

fn spawn_flush_loop(
    core: Arc<RelayCore>,
    rotator: Arc<CertRotator>,
    mut rx: mpsc::Receiver<BusMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let relay = &core.context().config.relay;
    let policy = BatchPolicy {
        max_size: relay.max_batch_size,
        max_wait: relay.max_batch_wait,
    };

    tokio::spawn(async move {
        while let Some(batch) = next_batch(&mut rx, policy, &cancel).await {
            flush(&core, rotator.as_ref(), &batch).await;
            if cancel.is_cancelled() {
                break;
            }
        }
    })
}

async fn flush(core: &RelayCore, rotator: &CertRotator, batch: &[BusMessage]) {
    let result = with_rotation_retry(rotator, || async move {
        let sealed = core.seal_all(batch).await;
        if sealed.is_empty() {
            return Ok(0);
        }
        let request = core.push_request(sealed).await?;
        let response = core.context().api.push(core.client_id(), &request).await?;
        Ok(response.accepted)
    })
    .await;

    match result {
        Ok(accepted) => {
            if accepted < batch.len() {
                tracing::warn!(sent = batch.len(), accepted, "Cloud accepted only part of the batch");
            } else {
                tracing::debug!(accepted, "Batch pushed");
            }
        }
        Err(e) => {
            tracing::warn!(dropped = batch.len(), error = %e, "Dropping batch after failed push");
        }
    }
}

fn spawn_poll_loop(
    core: Arc<RelayCore>,
    rotator: Arc<CertRotator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let relay = &core.context().config.relay;
        let wait = relay.poll_timeout;
        let mut backoff = Backoff::new(relay.reconnect_initial_backoff, relay.reconnect_max_backoff);

        while !cancel.is_cancelled() {
            let core_ref = core.as_ref();
            let result = with_rotation_retry(rotator.as_ref(), || async move {
                let challenge = core_ref.challenge().await?;
                core_ref
                    .context()
                    .api
                    .pull(core_ref.client_id(), &challenge, wait, None)
                    .await
            })
            .await;
            if cancel.is_cancelled() {
                break;
            }

            match result {
                Ok(messages) => {
                    backoff.reset();
                    for bridged in messages {
                        core.handle_inbound(bridged).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Long poll failed");
                    if !backoff.wait(&cancel).await {
                        break;
                    }
                }
            }
        }
    })
}
