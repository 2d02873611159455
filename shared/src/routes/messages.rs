//! REST message queue.
//!
//! POST /api/v1/message-queue: a signed batch of client messages. Each
//! message is handled on its own, so one bad envelope does not sink the rest.
//!
//! GET /api/v1/message-queue: long-poll for messages addressed to the
//! client. An empty array means the wait ran out.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use bridge_error::AppResult;
use bridge_types::{BridgedMessage, PullQuery, PushRequest, PushResponse};

use crate::cloud::{self, IngestError};
use crate::context::AppContext;
use crate::routes::extractors::{AuthorizedClient, LocationHeader};

pub async fn push_messages(
    State(ctx): State<Arc<AppContext>>,
    LocationHeader(client_id): LocationHeader,
    Json(request): Json<PushRequest>,
) -> AppResult<Json<PushResponse>> {
    ctx.authorize(&client_id, &request.auth_challenge).await?;
    let accepted = ingest_batch(&ctx, &client_id, &request.messages).await;
    Ok(Json(PushResponse { accepted }))
}

pub async fn pull_messages(
    State(ctx): State<Arc<AppContext>>,
    client: AuthorizedClient,
    Query(query): Query<PullQuery>,
) -> AppResult<Json<Vec<BridgedMessage>>> {
    let timeout = ctx.config.server.poll_timeout(query.timeout);
    let limit = query.limit.unwrap_or(ctx.config.server.pull_limit);
    let messages = cloud::pull_messages(&ctx, &client.location_id, timeout, limit).await?;
    if !messages.is_empty() {
        tracing::debug!(location_id = %client.location_id, count = messages.len(), "Delivering messages");
    }
    Ok(Json(messages))
}

/// Ingest every message, returning how many made it onto the bus.
pub(crate) async fn ingest_batch(
    ctx: &Arc<AppContext>,
    client_id: &str,
    messages: &[BridgedMessage],
) -> usize {
    let mut accepted = 0;
    for bridged in messages {
        match cloud::ingest(ctx, client_id, bridged).await {
            Ok(()) => accepted += 1,
            Err(IngestError::Codec(e)) if e.is_integrity() => {
                tracing::warn!(location_id = %client_id, "Dropping message with invalid signature");
            }
            Err(e) => {
                tracing::warn!(location_id = %client_id, error = %e, "Dropping client message");
            }
        }
    }
    accepted
}
