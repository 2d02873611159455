// ============================================================================
// Envelope Codec
// ============================================================================
//
// Key-store backed wrapper around `bridge_crypto::envelope`. Resolves the
// sender private key and recipient public key by location ID, and adds the
// bridged-message layer (bus message JSON inside an envelope inside a
// `BridgedMessage`).
//
// Every error here is fatal to one message only. Callers log and move on.
// ============================================================================

use std::sync::Arc;

use bridge_crypto::{envelope, CryptoError, Envelope, KeyPair, RsaPublicKey};
use bridge_types::{BridgedMessage, BusMessage, MESSAGE_FORMAT_VERSION};
use thiserror::Error;

use crate::keystore::{KeyStore, KeyStoreError};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no key record for {0}")]
    UnknownParty(String),

    #[error("no private key stored for {0}")]
    MissingPrivateKey(String),

    #[error("envelope from {actual}, expected {expected}")]
    UnexpectedParty { expected: String, actual: String },

    #[error("unsupported message format version {0}")]
    UnsupportedFormat(u32),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error("malformed bus message: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, CodecError::Crypto(e) if e.is_integrity())
    }
}

#[derive(Clone)]
pub struct EnvelopeCodec {
    key_store: Arc<dyn KeyStore>,
}

impl EnvelopeCodec {
    pub fn new(key_store: Arc<dyn KeyStore>) -> Self {
        Self { key_store }
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    pub(crate) async fn own_keypair(&self, id: &str) -> Result<KeyPair, CodecError> {
        let record = self
            .key_store
            .get(id)
            .await?
            .ok_or_else(|| CodecError::UnknownParty(id.to_string()))?;
        match record.keypair() {
            Some(pair) => Ok(pair?),
            None => Err(CodecError::MissingPrivateKey(id.to_string())),
        }
    }

    async fn public_key(&self, id: &str) -> Result<RsaPublicKey, CodecError> {
        let record = self
            .key_store
            .get(id)
            .await?
            .ok_or_else(|| CodecError::UnknownParty(id.to_string()))?;
        Ok(record.public_key()?)
    }

    pub async fn seal(
        &self,
        plain: &[u8],
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<Envelope, CodecError> {
        let sender = self.own_keypair(sender_id).await?;
        let recipient = self.public_key(recipient_id).await?;
        Ok(envelope::seal(
            plain,
            sender_id,
            recipient_id,
            sender.private_key(),
            &recipient,
        )?)
    }

    /// Open using the IDs the envelope itself names.
    pub async fn open(&self, sealed: &Envelope) -> Result<Vec<u8>, CodecError> {
        let recipient = self.own_keypair(sealed.recipient_id()).await?;
        let sender = self.public_key(sealed.sender_id()).await?;
        Ok(envelope::open(sealed, recipient.private_key(), &sender)?)
    }

    /// Open, insisting on the expected sender and recipient.
    pub async fn open_from(
        &self,
        sealed: &Envelope,
        expected_sender: &str,
        expected_recipient: &str,
    ) -> Result<Vec<u8>, CodecError> {
        if sealed.sender_id() != expected_sender {
            return Err(CodecError::UnexpectedParty {
                expected: expected_sender.to_string(),
                actual: sealed.sender_id().to_string(),
            });
        }
        if sealed.recipient_id() != expected_recipient {
            return Err(CodecError::UnexpectedParty {
                expected: expected_recipient.to_string(),
                actual: sealed.recipient_id().to_string(),
            });
        }
        self.open(sealed).await
    }

    /// Seal a bus message for the boundary. `client_id` names the on-prem
    /// party whichever way the message travels.
    pub async fn seal_message(
        &self,
        message: &BusMessage,
        client_id: &str,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<BridgedMessage, CodecError> {
        let plain = message.to_json_bytes()?;
        let sealed = self.seal(&plain, sender_id, recipient_id).await?;
        Ok(BridgedMessage::new(client_id, &sealed)?)
    }

    pub async fn open_message(
        &self,
        bridged: &BridgedMessage,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<BusMessage, CodecError> {
        if bridged.format_version != MESSAGE_FORMAT_VERSION {
            return Err(CodecError::UnsupportedFormat(bridged.format_version));
        }
        let sealed = Envelope::from_json(&bridged.envelope)?;
        let plain = self.open_from(&sealed, sender_id, recipient_id).await?;
        Ok(BusMessage::from_json_bytes(&plain)?)
    }
}
