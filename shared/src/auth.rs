// ============================================================================
// Auth Challenge Authority
// ============================================================================
//
// Issues and checks signed timestamps against key-store entries, and runs
// the proactive rotation gate for privileged endpoints.
//
// Gate order: unknown party or bad challenge first (401), then rotation due
// (495). A client whose key must rotate can still prove who it is.
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use bridge_crypto::AuthChallenge;
use chrono::Utc;
use thiserror::Error;

use crate::codec::CodecError;
use crate::keystore::{KeyRecord, KeyStore, KeyStoreError};

#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("unknown location {0}")]
    UnknownParty(String),

    #[error("invalid auth challenge")]
    InvalidChallenge,

    #[error("certificate rotation required")]
    RotationRequired,

    #[error(transparent)]
    Store(#[from] KeyStoreError),
}

#[derive(Clone)]
pub struct ChallengeAuthority {
    key_store: Arc<dyn KeyStore>,
    max_age: Duration,
}

impl ChallengeAuthority {
    pub fn new(key_store: Arc<dyn KeyStore>, max_age: Duration) -> Self {
        Self { key_store, max_age }
    }

    /// Sign the current time with `party_id`'s own private key.
    pub async fn new_challenge(&self, party_id: &str) -> Result<AuthChallenge, CodecError> {
        let record = self
            .key_store
            .get(party_id)
            .await?
            .ok_or_else(|| CodecError::UnknownParty(party_id.to_string()))?;
        let pair = record
            .keypair()
            .ok_or_else(|| CodecError::MissingPrivateKey(party_id.to_string()))??;
        Ok(AuthChallenge::new(pair.private_key())?)
    }

    pub async fn validate(&self, claimed_id: &str, challenge: &AuthChallenge) -> bool {
        match self.key_store.get(claimed_id).await {
            Ok(Some(record)) => self.check(&record, challenge),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(location_id = %claimed_id, error = %e, "Key lookup failed during validation");
                false
            }
        }
    }

    fn check(&self, record: &KeyRecord, challenge: &AuthChallenge) -> bool {
        match record.public_key() {
            Ok(public) => challenge.validate(&public, self.max_age),
            Err(_) => false,
        }
    }

    /// Challenge check without the rotation gate. Used by the rotation
    /// endpoint itself.
    pub async fn authenticate(
        &self,
        claimed_id: &str,
        challenge: &AuthChallenge,
    ) -> Result<KeyRecord, AuthFailure> {
        let record = self
            .key_store
            .get(claimed_id)
            .await?
            .ok_or_else(|| AuthFailure::UnknownParty(claimed_id.to_string()))?;
        if !self.check(&record, challenge) {
            return Err(AuthFailure::InvalidChallenge);
        }
        Ok(record)
    }

    /// Full gate for privileged endpoints.
    pub async fn authorize(
        &self,
        claimed_id: &str,
        challenge: &AuthChallenge,
        rotation_timeout: Option<Duration>,
    ) -> Result<KeyRecord, AuthFailure> {
        let record = self.authenticate(claimed_id, challenge).await?;
        if record.rotation_due(Utc::now(), rotation_timeout) {
            return Err(AuthFailure::RotationRequired);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client_keys, seeded_store, CLIENT_ID, CLOUD_ID};

    const WINDOW: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_new_challenge_validates() {
        let store = seeded_store().await;
        let authority = ChallengeAuthority::new(store, WINDOW);
        let challenge = authority.new_challenge(CLOUD_ID).await.unwrap();
        assert!(authority.validate(CLOUD_ID, &challenge).await);
        assert!(!authority.validate(CLIENT_ID, &challenge).await);
        assert!(!authority.validate("nobody", &challenge).await);
    }

    #[tokio::test]
    async fn test_mutated_or_stale_challenge_fails() {
        let authority = ChallengeAuthority::new(seeded_store().await, WINDOW);
        let mut challenge = AuthChallenge::new(client_keys().private_key()).unwrap();
        challenge.challenge_text.push('x');
        assert!(!authority.validate(CLIENT_ID, &challenge).await);

        let stale = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let old = AuthChallenge::with_text(stale, client_keys().private_key()).unwrap();
        assert!(!authority.validate(CLIENT_ID, &old).await);

        let relaxed = ChallengeAuthority::new(seeded_store().await, Duration::ZERO);
        assert!(relaxed.validate(CLIENT_ID, &old).await);
    }

    #[tokio::test]
    async fn test_authorize_gate_order() {
        let store = seeded_store().await;
        let authority = ChallengeAuthority::new(store.clone(), WINDOW);
        let good = AuthChallenge::new(client_keys().private_key()).unwrap();
        let bad = AuthChallenge::with_text("nope", client_keys().private_key()).unwrap();

        assert!(authority.authorize(CLIENT_ID, &good, None).await.is_ok());
        assert!(matches!(
            authority.authorize("nobody", &good, None).await,
            Err(AuthFailure::UnknownParty(_))
        ));

        let mut record = store.get(CLIENT_ID).await.unwrap().unwrap();
        record.force_rotation = true;
        store.put(CLIENT_ID, &record).await.unwrap();

        assert!(matches!(
            authority.authorize(CLIENT_ID, &bad, None).await,
            Err(AuthFailure::InvalidChallenge)
        ));
        assert!(matches!(
            authority.authorize(CLIENT_ID, &good, None).await,
            Err(AuthFailure::RotationRequired)
        ));
        assert!(authority.authenticate(CLIENT_ID, &good).await.is_ok());
    }
}
