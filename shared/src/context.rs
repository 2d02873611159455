// ============================================================================
// Cloud Application Context
// ============================================================================
//
// Everything a route handler or background task of the cloud service needs,
// built once at startup and shared as `Arc<AppContext>`.
//
// ============================================================================

use std::sync::Arc;

use bridge_config::Config;
use bridge_crypto::AuthChallenge;
use bridge_error::{AppError, AppResult};

use crate::auth::{AuthFailure, ChallengeAuthority};
use crate::auth_backend::AuthBackend;
use crate::bus::MessageBus;
use crate::cache::MessageCache;
use crate::codec::EnvelopeCodec;
use crate::keystore::{KeyRecord, KeyStore};
use crate::subscriptions::SubscriptionManager;

pub struct AppContext {
    pub config: Arc<Config>,
    pub bus: Arc<dyn MessageBus>,
    pub key_store: Arc<dyn KeyStore>,
    pub cache: Arc<dyn MessageCache>,
    pub codec: EnvelopeCodec,
    pub authority: ChallengeAuthority,
    pub auth_backend: AuthBackend,
    pub subscriptions: Arc<SubscriptionManager>,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        bus: Arc<dyn MessageBus>,
        key_store: Arc<dyn KeyStore>,
        cache: Arc<dyn MessageCache>,
    ) -> Self {
        let codec = EnvelopeCodec::new(key_store.clone());
        let authority = ChallengeAuthority::new(key_store.clone(), config.security.challenge_max_age);
        let auth_backend = AuthBackend::new(
            bus.clone(),
            config.subjects.auth_subject.clone(),
            config.registration.auth_timeout,
        );
        let subscriptions = Arc::new(SubscriptionManager::new(
            bus.clone(),
            key_store.clone(),
            config.subjects.clone(),
            config.cloud_id.clone(),
        ));

        Self {
            config,
            bus,
            key_store,
            cache,
            codec,
            authority,
            auth_backend,
            subscriptions,
        }
    }

    pub fn cloud_id(&self) -> &str {
        &self.config.cloud_id
    }

    /// Challenge check plus the rotation gate.
    pub async fn authorize(&self, client_id: &str, challenge: &AuthChallenge) -> AppResult<KeyRecord> {
        if client_id == self.cloud_id() {
            return Err(AppError::auth("invalid location"));
        }
        Ok(self
            .authority
            .authorize(client_id, challenge, self.config.security.rotation_timeout)
            .await?)
    }

    /// Challenge check only.
    pub async fn authenticate(&self, client_id: &str, challenge: &AuthChallenge) -> AppResult<KeyRecord> {
        if client_id == self.cloud_id() {
            return Err(AppError::auth("invalid location"));
        }
        Ok(self.authority.authenticate(client_id, challenge).await?)
    }
}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::UnknownParty(_) => AppError::auth("unknown location"),
            AuthFailure::InvalidChallenge => AppError::auth("invalid challenge"),
            AuthFailure::RotationRequired => AppError::certificate_invalid("rotation required"),
            AuthFailure::Store(e) => AppError::key_store(e.to_string()),
        }
    }
}
