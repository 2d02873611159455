//! POST /api/v1/certificate/rotate
//!
//! The client proves possession of its current key with the challenge and
//! sends its new public key sealed under that same key. Not gated by the
//! rotation check, since this is how a client gets past it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use bridge_error::{AppError, AppResult};
use bridge_types::{LocationId, RotationRequest};
use chrono::Utc;

use crate::codec::CodecError;
use crate::context::AppContext;
use crate::keystore::KeyRecord;

pub async fn rotate_certificate(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<RotationRequest>,
) -> AppResult<StatusCode> {
    let client_id = LocationId::parse(&request.prem_id)
        .map_err(|_| AppError::validation("invalid premID"))?;
    let client_id = client_id.as_str();

    let current = ctx.authenticate(client_id, &request.auth_challenge).await?;

    let plain = ctx
        .codec
        .open_from(&request.public_key_envelope, client_id, ctx.cloud_id())
        .await
        .map_err(|e| match e {
            CodecError::UnexpectedParty { .. } => AppError::auth("envelope parties do not match"),
            e if e.is_integrity() => {
                tracing::warn!(location_id = %client_id, "Rotation envelope failed verification");
                AppError::auth("envelope verification failed")
            }
            other => AppError::validation(other.to_string()),
        })?;

    let pem = String::from_utf8(plain).map_err(|_| AppError::validation("public key is not UTF-8"))?;
    let mut rotated = KeyRecord::from_public_pem(&pem)
        .map_err(|e| AppError::validation(format!("invalid public key: {}", e)))?;
    rotated.metadata = current.metadata;
    rotated.last_key_rotation_time = Utc::now();
    rotated.force_rotation = false;

    ctx.key_store
        .put(client_id, &rotated)
        .await
        .map_err(|e| AppError::key_store(e.to_string()))?;

    tracing::info!(location_id = %client_id, "Client certificate rotated");
    Ok(StatusCode::NO_CONTENT)
}
