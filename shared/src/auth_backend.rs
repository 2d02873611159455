//! Registration credential check.
//!
//! The cloud does not judge credentials itself. It forwards
//! `{userID, secret, premID}` as a bus request to the auth backend subject and
//! waits for `{valid, reason?}`.

use std::sync::Arc;
use std::time::Duration;

use bridge_types::{AuthBackendReply, AuthBackendRequest, BusMessage};
use thiserror::Error;

use crate::bus::{BusError, MessageBus};

#[derive(Debug, Error)]
pub enum AuthBackendError {
    #[error("registration rejected: {0}")]
    Rejected(String),

    #[error("auth backend did not answer in time")]
    Timeout,

    #[error("auth backend unreachable: {0}")]
    Unavailable(BusError),

    #[error("malformed auth backend reply: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct AuthBackend {
    bus: Arc<dyn MessageBus>,
    subject: String,
    timeout: Duration,
}

impl AuthBackend {
    pub fn new(bus: Arc<dyn MessageBus>, subject: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus,
            subject: subject.into(),
            timeout,
        }
    }

    pub async fn check(&self, request: &AuthBackendRequest) -> Result<(), AuthBackendError> {
        let body = serde_json::to_vec(request)?;
        let reply = self
            .bus
            .request(BusMessage::new(self.subject.as_str(), body), self.timeout)
            .await
            .map_err(|e| match e {
                BusError::Timeout => AuthBackendError::Timeout,
                other => AuthBackendError::Unavailable(other),
            })?;

        let reply: AuthBackendReply = serde_json::from_slice(&reply.data)?;
        if reply.valid {
            Ok(())
        } else {
            Err(AuthBackendError::Rejected(
                reply.reason.unwrap_or_else(|| "invalid credentials".to_string()),
            ))
        }
    }
}
