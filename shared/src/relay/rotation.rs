// ============================================================================
// Certificate Rotation (client side)
// ============================================================================
//
// Normal -> Rotating -> Normal. Triggered by a 495 on any privileged call or
// a 4495 close on the socket.
//
// Rotations are serialized by a mutex and counted by a generation number.
// Callers record the generation they saw before the failing call; when a
// rotation finishes while they wait for the mutex, they skip their own.
// ============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bridge_crypto::KeyPair;
use bridge_types::RotationRequest;
use tokio::sync::Mutex;

use super::{RelayContext, TransportError};
use crate::keystore::KeyRecord;

#[async_trait]
pub trait CertificateRotation: Send + Sync {
    /// Number of completed rotations.
    fn generation(&self) -> u64;

    /// Rotate unless the generation has moved past `observed`.
    async fn rotate(&self, observed: u64) -> Result<(), TransportError>;
}

/// Run `operation`. On a certificate failure rotate once and retry once.
/// A failed rotation abandons the call.
pub async fn with_rotation_retry<T, F, Fut>(
    rotator: &dyn CertificateRotation,
    mut operation: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let observed = rotator.generation();
    match operation().await {
        Err(TransportError::CertificateInvalid) => {
            tracing::info!("Cloud demanded certificate rotation");
            rotator.rotate(observed).await?;
            operation().await
        }
        other => other,
    }
}

pub struct CertRotator {
    ctx: RelayContext,
    client_id: String,
    lock: Mutex<()>,
    generation: AtomicU64,
}

impl CertRotator {
    pub fn new(ctx: RelayContext, client_id: impl Into<String>) -> Self {
        Self {
            ctx,
            client_id: client_id.into(),
            lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    async fn perform(&self) -> Result<(), TransportError> {
        let client_id = self.client_id.as_str();
        let cloud_id = self.ctx.config.cloud_id.as_str();

        let current = self
            .ctx
            .key_store
            .get(client_id)
            .await
            .map_err(|e| TransportError::Rotation(e.to_string()))?
            .ok_or_else(|| TransportError::Rotation(format!("no key record for {}", client_id)))?;

        let key_bits = self.ctx.config.security.key_bits;
        let fresh = tokio::task::spawn_blocking(move || KeyPair::generate(key_bits))
            .await
            .map_err(|e| TransportError::Rotation(e.to_string()))?
            .map_err(|e| TransportError::Rotation(e.to_string()))?;
        let fresh_pem = fresh
            .public_key_pem()
            .map_err(|e| TransportError::Rotation(e.to_string()))?;

        // Both the envelope and the challenge are signed with the old key
        let public_key_envelope = self
            .ctx
            .codec
            .seal(fresh_pem.as_bytes(), client_id, cloud_id)
            .await?;
        let auth_challenge = self.ctx.authority.new_challenge(client_id).await?;

        self.ctx
            .api
            .rotate(&RotationRequest {
                prem_id: client_id.to_string(),
                public_key_envelope,
                auth_challenge,
            })
            .await
            .map_err(|e| TransportError::Rotation(e.to_string()))?;

        let mut record =
            KeyRecord::from_keypair(&fresh).map_err(|e| TransportError::Rotation(e.to_string()))?;
        record.metadata = current.metadata;
        self.ctx
            .key_store
            .put(client_id, &record)
            .await
            .map_err(|e| TransportError::Rotation(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CertificateRotation for CertRotator {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    async fn rotate(&self, observed: u64) -> Result<(), TransportError> {
        let _guard = self.lock.lock().await;
        if self.generation() != observed {
            tracing::debug!(location_id = %self.client_id, "Rotation already done by another task");
            return Ok(());
        }

        tracing::info!(location_id = %self.client_id, "Rotating client certificate");
        match self.perform().await {
            Ok(()) => {
                self.generation.fetch_add(1, Ordering::AcqRel);
                tracing::info!(location_id = %self.client_id, "Client certificate rotated");
                Ok(())
            }
            Err(e) => {
                tracing::error!(location_id = %self.client_id, error = %e, "Certificate rotation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountingRotator {
        generation: AtomicU64,
        rotations: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl CertificateRotation for CountingRotator {
        fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }

        async fn rotate(&self, observed: u64) -> Result<(), TransportError> {
            if self.generation() != observed {
                return Ok(());
            }
            self.rotations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TransportError::Rotation("refused".into()));
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_needs_no_rotation() {
        let rotator = CountingRotator::default();
        let calls = AtomicU32::new(0);
        let result = with_rotation_retry(&rotator, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rotator.rotations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rotates_once_and_retries_once() {
        let rotator = CountingRotator::default();
        let calls = AtomicU32::new(0);
        let result = with_rotation_retry(&rotator, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::CertificateInvalid)
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rotator.rotations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_failure_is_not_retried_again() {
        let rotator = CountingRotator::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_rotation_retry(&rotator, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::CertificateInvalid)
        })
        .await;
        assert!(matches!(result, Err(TransportError::CertificateInvalid)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rotator.rotations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_rotation_abandons_call() {
        let rotator = CountingRotator {
            fail: true,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_rotation_retry(&rotator, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::CertificateInvalid)
        })
        .await;
        assert!(matches!(result, Err(TransportError::Rotation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let rotator = CountingRotator::default();
        let result: Result<(), _> = with_rotation_retry(&rotator, || async {
            Err(TransportError::Network("refused".into()))
        })
        .await;
        assert!(matches!(result, Err(TransportError::Network(_))));
        assert_eq!(rotator.rotations.load(Ordering::SeqCst), 0);
    }
}
