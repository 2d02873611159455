//! POST /api/v1/register
//!
//! First contact for a new on-prem agent. Credentials are checked by the
//! auth backend over the bus; on success the client's public key is stored
//! under a freshly minted location ID and a `client.added` event goes out.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use bridge_error::{AppError, AppResult};
use bridge_types::{AuthBackendRequest, LocationId, RegistrationRequest, RegistrationResponse};

use crate::auth_backend::AuthBackendError;
use crate::context::AppContext;
use crate::keystore::KeyRecord;
use crate::subscriptions::publish_lifecycle;

pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<RegistrationRequest>,
) -> AppResult<(StatusCode, Json<RegistrationResponse>)> {
    if request.prem_id.trim().is_empty() || request.user_id.trim().is_empty() {
        return Err(AppError::validation("premID and userID are required"));
    }
    let record = KeyRecord::from_public_pem(&request.public_key)
        .map_err(|e| AppError::validation(format!("invalid public key: {}", e)))?;

    ctx.auth_backend
        .check(&AuthBackendRequest {
            user_id: request.user_id.clone(),
            secret: request.secret.clone(),
            prem_id: request.prem_id.clone(),
        })
        .await
        .map_err(|e| match e {
            AuthBackendError::Rejected(reason) => AppError::forbidden(reason),
            AuthBackendError::Timeout => AppError::timeout("auth backend"),
            other => AppError::bus(other.to_string()),
        })?;

    let cloud = ctx
        .key_store
        .get(ctx.cloud_id())
        .await
        .map_err(|e| AppError::key_store(e.to_string()))?
        .ok_or_else(|| AppError::internal("cloud identity missing"))?;

    let location_id = LocationId::generate();
    let record = record
        .with_metadata("premID", request.prem_id.as_str())
        .with_metadata("userID", request.user_id.as_str());
    ctx.key_store
        .put(location_id.as_str(), &record)
        .await
        .map_err(|e| AppError::key_store(e.to_string()))?;

    if let Err(e) = ctx.subscriptions.add_client(location_id.as_str()).await {
        tracing::warn!(location_id = %location_id, error = %e, "Failed to open subscription for new client");
    }
    if let Err(e) = publish_lifecycle(
        ctx.bus.as_ref(),
        ctx.config.subjects.client_added(),
        location_id.as_str(),
    )
    .await
    {
        tracing::warn!(location_id = %location_id, error = %e, "Failed to publish client.added");
    }

    tracing::info!(
        location_id = %location_id,
        prem_id = %request.prem_id,
        user_id = %request.user_id,
        "Client registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            cloud_public_key: cloud.public_key,
            location_id: location_id.to_string(),
        }),
    ))
}
