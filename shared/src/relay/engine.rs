//! Forwarding rules shared by both transports.
//!
//! Outbound (local bus -> cloud):
//! - one subscription per forward pattern
//! - skip messages this relay injected itself (`Bridge-Origin` = own ID)
//! - skip `_INBOX.` subjects, they only mean something to the local process
//! - stamp the client marker on echo subjects
//!
//! Inbound (cloud -> local bus): open, check, stamp origin, republish. A
//! message with a reply subject becomes a local request whose answer is sent
//! back to the cloud on that subject.

use std::sync::Arc;
use std::time::Duration;

use bridge_crypto::AuthChallenge;
use bridge_types::{BridgedMessage, BusMessage, PushRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{RelayContext, TransportError};
use crate::bus::validate_subject;
use crate::codec::CodecError;
use crate::echo;

const PUMP_WAKEUP: Duration = Duration::from_secs(5);

pub struct RelayCore {
    ctx: RelayContext,
    client_id: String,
    outbound: mpsc::Sender<BusMessage>,
}

impl RelayCore {
    pub fn new(ctx: RelayContext, client_id: impl Into<String>, outbound: mpsc::Sender<BusMessage>) -> Self {
        Self {
            ctx,
            client_id: client_id.into(),
            outbound,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn context(&self) -> &RelayContext {
        &self.ctx
    }

    pub fn should_forward(&self, message: &BusMessage) -> bool {
        message.origin() != Some(self.client_id.as_str()) && !message.is_inbox()
    }

    /// Subscribe every forward pattern and feed accepted messages into the
    /// outbound queue.
    pub async fn spawn_pumps(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, TransportError> {
        let mut subscriptions = Vec::new();
        for pattern in &self.ctx.config.relay.forward_subjects {
            subscriptions.push(self.ctx.bus.subscribe(pattern).await?);
        }

        let mut tasks = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let core = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                tracing::debug!(pattern = %subscription.pattern(), "Forwarding local subject");
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = subscription.next_message(PUMP_WAKEUP) => next,
                    };
                    match next {
                        Ok(Some(mut message)) => {
                            if !core.should_forward(&message) {
                                continue;
                            }
                            echo::stamp(&mut message, &echo::client_marker(&core.client_id));
                            if core.outbound.send(message).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(pattern = %subscription.pattern(), error = %e, "Local subscription ended");
                            break;
                        }
                    }
                }
            }));
        }
        Ok(tasks)
    }

    /// Seal client -> cloud.
    pub async fn seal(&self, message: &BusMessage) -> Result<BridgedMessage, CodecError> {
        self.ctx
            .codec
            .seal_message(message, &self.client_id, &self.client_id, &self.ctx.config.cloud_id)
            .await
    }

    /// Seal a batch, dropping (and logging) messages that fail.
    pub async fn seal_all(&self, messages: &[BusMessage]) -> Vec<BridgedMessage> {
        let mut sealed = Vec::with_capacity(messages.len());
        for message in messages {
            match self.seal(message).await {
                Ok(bridged) => sealed.push(bridged),
                Err(e) => {
                    tracing::warn!(subject = %message.subject, error = %e, "Dropping message that failed to seal");
                }
            }
        }
        sealed
    }

    pub async fn challenge(&self) -> Result<AuthChallenge, TransportError> {
        Ok(self.ctx.authority.new_challenge(&self.client_id).await?)
    }

    pub async fn push_request(&self, messages: Vec<BridgedMessage>) -> Result<PushRequest, TransportError> {
        Ok(PushRequest {
            auth_challenge: self.challenge().await?,
            messages,
        })
    }

    /// Deliver one message from the cloud. Errors are logged and dropped.
    pub async fn handle_inbound(self: &Arc<Self>, bridged: BridgedMessage) {
        if let Err(e) = self.try_handle_inbound(bridged).await {
            match &e {
                TransportError::Codec(c) if c.is_integrity() => {
                    tracing::warn!(sender = %self.ctx.config.cloud_id, "Dropping inbound message with invalid signature");
                }
                _ => tracing::warn!(error = %e, "Dropping inbound message"),
            }
        }
    }

    async fn try_handle_inbound(self: &Arc<Self>, bridged: BridgedMessage) -> Result<(), TransportError> {
        if bridged.client_id != self.client_id {
            return Err(TransportError::Codec(CodecError::UnexpectedParty {
                expected: self.client_id.clone(),
                actual: bridged.client_id,
            }));
        }
        let mut message = self
            .ctx
            .codec
            .open_message(&bridged, &self.ctx.config.cloud_id, &self.client_id)
            .await?;
        validate_subject(&message.subject)?;
        message.set_origin(&self.client_id);

        match message.reply_to.take() {
            Some(reply_to) => {
                let core = Arc::clone(self);
                tokio::spawn(async move {
                    core.answer_request(message, reply_to).await;
                });
            }
            None => {
                tracing::debug!(subject = %message.subject, "Republishing cloud message");
                self.ctx.bus.publish(message).await?;
            }
        }
        Ok(())
    }

    async fn answer_request(&self, request: BusMessage, reply_to: String) {
        let subject = request.subject.clone();
        let reply = match self
            .ctx
            .bus
            .request(request, self.ctx.config.bus.request_timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "Local request failed");
                return;
            }
        };

        let mut routed = BusMessage::new(reply_to, reply.data);
        routed.headers = reply.headers;
        routed.set_origin(&self.client_id);
        if self.outbound.send(routed).await.is_err() {
            tracing::warn!(subject = %subject, "Relay stopped before reply could be forwarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, MessageBus};
    use crate::testing::{seeded_store, CLIENT_ID};
    use bridge_config::Config;
    use bridge_types::ORIGIN_HEADER;

    async fn core() -> (Arc<RelayCore>, MemoryBus, mpsc::Receiver<BusMessage>) {
        let bus = MemoryBus::new();
        let ctx = RelayContext::new(Arc::new(Config::default()), Arc::new(bus.clone()), seeded_store().await).unwrap();
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(RelayCore::new(ctx, CLIENT_ID, tx)), bus, rx)
    }

    #[tokio::test]
    async fn test_forward_filter() {
        let (core, _bus, _rx) = core().await;
        assert!(core.should_forward(&BusMessage::new("svc.echo", "x")));
        assert!(!core.should_forward(&BusMessage::new("_INBOX.abc", "x")));
        assert!(!core.should_forward(&BusMessage::new("svc.echo", "x").with_header(ORIGIN_HEADER, CLIENT_ID)));
        assert!(core.should_forward(&BusMessage::new("svc.echo", "x").with_header(ORIGIN_HEADER, "loc-9")));
    }

    #[tokio::test]
    async fn test_pumps_stamp_and_filter() {
        let (core, bus, mut rx) = core().await;
        let cancel = CancellationToken::new();
        core.spawn_pumps(cancel.clone()).await.unwrap();

        bus.publish(BusMessage::new("svc.echo", "ping")).await.unwrap();
        bus.publish(BusMessage::new("svc.echo", "loop").with_header(ORIGIN_HEADER, CLIENT_ID))
            .await
            .unwrap();
        bus.publish(BusMessage::new("svc.time", "now")).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.text(), "ping | client:loc-7");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.text(), "now");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_inbound_republished_with_origin() {
        let (core, bus, _rx) = core().await;
        let local = bus.subscribe("resp.1").await.unwrap();

        // A cloud-sealed message, built with the shared test store
        let sealed = core
            .context()
            .codec
            .seal_message(&BusMessage::new("resp.1", "pong"), CLIENT_ID, "cloud", CLIENT_ID)
            .await
            .unwrap();
        core.handle_inbound(sealed).await;

        let got = local.next_message(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(got.text(), "pong");
        assert_eq!(got.origin(), Some(CLIENT_ID));
    }

    #[tokio::test]
    async fn test_inbound_request_reply_goes_back_outbound() {
        let (core, bus, mut rx) = core().await;
        let responder = bus.subscribe("svc.time").await.unwrap();
        let responder_bus = bus.clone();
        tokio::spawn(async move {
            if let Ok(Some(request)) = responder.next_message(Duration::from_secs(5)).await {
                let reply_to = request.reply_to.unwrap();
                responder_bus.publish(BusMessage::new(reply_to, "noon")).await.unwrap();
            }
        });

        let sealed = core
            .context()
            .codec
            .seal_message(
                &BusMessage::new("svc.time", "?").with_reply_to("_INBOX.cloudside"),
                CLIENT_ID,
                "cloud",
                CLIENT_ID,
            )
            .await
            .unwrap();
        core.handle_inbound(sealed).await;

        let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(reply.subject, "_INBOX.cloudside");
        assert_eq!(reply.text(), "noon");
    }

    #[tokio::test]
    async fn test_inbound_for_other_client_dropped() {
        let (core, bus, _rx) = core().await;
        let local = bus.subscribe(">").await.unwrap();
        let mut sealed = core
            .context()
            .codec
            .seal_message(&BusMessage::new("resp.1", "pong"), CLIENT_ID, "cloud", CLIENT_ID)
            .await
            .unwrap();
        sealed.client_id = "loc-9".into();
        core.handle_inbound(sealed).await;
        assert!(local.try_next().is_none());
    }
}
