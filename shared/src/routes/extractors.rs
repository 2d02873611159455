// ============================================================================
// Client Identity Extractors
// ============================================================================
//
// `LocationHeader` reads and validates `x-bridge-location-id`.
//
// `AuthorizedClient` additionally reads the challenge headers and runs the
// full gate (challenge, then rotation). A client whose key must rotate is
// turned away with 495 before the handler runs.
//
// ============================================================================

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use bridge_crypto::AuthChallenge;
use bridge_error::AppError;
use bridge_types::{LocationId, CHALLENGE_HEADER, CHALLENGE_SIGNATURE_HEADER, LOCATION_HEADER};

use crate::context::AppContext;
use crate::keystore::KeyRecord;

#[derive(Debug, Clone)]
pub struct LocationHeader(pub String);

#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    pub location_id: String,
    pub record: KeyRecord,
}

fn header(parts: &Parts, name: &str) -> Result<String, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::auth(format!("missing {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for LocationHeader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, LOCATION_HEADER)?;
        let id = LocationId::parse(&raw).map_err(|_| AppError::auth("invalid location"))?;
        Ok(Self(id.as_str().to_string()))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthorizedClient {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let LocationHeader(location_id) = LocationHeader::from_request_parts(parts, ctx).await?;
        let challenge = AuthChallenge {
            challenge_text: header(parts, CHALLENGE_HEADER)?,
            challenge_signature: header(parts, CHALLENGE_SIGNATURE_HEADER)?,
        };
        let record = ctx.authorize(&location_id, &challenge).await?;
        Ok(Self {
            location_id,
            record,
        })
    }
}
