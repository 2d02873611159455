//! Cloud-to-client delivery: traffic collected on a client's subscription is
//! sealed (cloud -> client) with its subject stripped back to the one the
//! client should republish on.

use std::time::Duration;

use bridge_types::{BridgedMessage, BusMessage};

use crate::codec::CodecError;
use crate::context::AppContext;
use bridge_error::{AppError, AppResult};

pub async fn seal_for_client(
    ctx: &AppContext,
    client_id: &str,
    mut message: BusMessage,
) -> Result<BridgedMessage, CodecError> {
    if let Some(local) = ctx.config.subjects.strip_client_prefix(client_id, &message.subject) {
        message.subject = local.to_string();
    }
    ctx.codec
        .seal_message(&message, client_id, ctx.cloud_id(), client_id)
        .await
}

/// Long-poll: cached messages first, otherwise wait up to `timeout` for the
/// first live one, then take whatever else is already buffered up to `limit`.
/// A client whose subscription was closed by `client.removed` gets 404.
pub async fn pull_messages(
    ctx: &AppContext,
    client_id: &str,
    timeout: Duration,
    limit: usize,
) -> AppResult<Vec<BridgedMessage>> {
    let limit = limit.max(1);
    let mut out = Vec::new();

    for entry in ctx
        .cache
        .pop(client_id, limit)
        .await
        .map_err(|e| AppError::cache(e.to_string()))?
    {
        match serde_json::from_str::<BridgedMessage>(&entry) {
            Ok(bridged) => out.push(bridged),
            Err(e) => tracing::warn!(location_id = %client_id, error = %e, "Dropping corrupt cached message"),
        }
    }
    if !out.is_empty() {
        return Ok(out);
    }

    // Only registration and lifecycle events open subscriptions
    let subscription = ctx
        .subscriptions
        .subscription_for_client(client_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("no subscription for client {}", client_id)))?;

    let first = match subscription.next_message(timeout).await {
        Ok(Some(message)) => message,
        Ok(None) => return Ok(out),
        Err(e) => return Err(AppError::bus(e.to_string())),
    };

    let mut pending = vec![first];
    while pending.len() < limit {
        match subscription.try_next() {
            Some(message) => pending.push(message),
            None => break,
        }
    }

    for message in pending {
        let subject = message.subject.clone();
        match seal_for_client(ctx, client_id, message).await {
            Ok(bridged) => out.push(bridged),
            Err(e) => tracing::warn!(location_id = %client_id, subject = %subject, error = %e, "Dropping undeliverable message"),
        }
    }
    Ok(out)
}
