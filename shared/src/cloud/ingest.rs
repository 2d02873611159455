//! Client-to-cloud delivery.
//!
//! An inbound bridged message is opened (client -> cloud), stamped with the
//! client's origin and republished on the cloud bus. When it carries a
//! reply subject, the cloud issues the request itself and routes the answer
//! back to `<client_prefix>.<client>.<reply_to>` where the client's
//! subscription picks it up.

use std::sync::Arc;

use bridge_types::{BridgedMessage, BusMessage};
use thiserror::Error;

use crate::bus::{validate_subject, BusError};
use crate::codec::CodecError;
use crate::context::AppContext;
use crate::echo;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("message addressed for {actual}, sender is {expected}")]
    WrongClient { expected: String, actual: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

pub async fn ingest(
    ctx: &Arc<AppContext>,
    client_id: &str,
    bridged: &BridgedMessage,
) -> Result<(), IngestError> {
    if bridged.client_id != client_id {
        return Err(IngestError::WrongClient {
            expected: client_id.to_string(),
            actual: bridged.client_id.clone(),
        });
    }

    let mut message = ctx
        .codec
        .open_message(bridged, client_id, ctx.cloud_id())
        .await?;
    validate_subject(&message.subject)?;
    echo::stamp(&mut message, &echo::server_marker(ctx.cloud_id()));
    message.set_origin(client_id);

    match message.reply_to.take() {
        Some(reply_to) => {
            validate_subject(&reply_to)?;
            let ctx = Arc::clone(ctx);
            let client_id = client_id.to_string();
            tokio::spawn(async move {
                relay_request(&ctx, &client_id, message, &reply_to).await;
            });
        }
        None => {
            tracing::debug!(location_id = %client_id, subject = %message.subject, "Publishing client message");
            ctx.bus.publish(message).await?;
        }
    }
    Ok(())
}

async fn relay_request(ctx: &AppContext, client_id: &str, request: BusMessage, reply_to: &str) {
    let subject = request.subject.clone();
    let timeout = ctx.config.bus.request_timeout;
    let reply = match ctx.bus.request(request, timeout).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(location_id = %client_id, subject = %subject, error = %e, "Relayed request failed");
            return;
        }
    };

    let mut routed = BusMessage::new(ctx.config.subjects.client_subject(client_id, reply_to), reply.data);
    routed.headers = reply.headers;
    if let Err(e) = ctx.bus.publish(routed).await {
        tracing::warn!(location_id = %client_id, subject = %reply_to, error = %e, "Failed to route reply");
    }
}
