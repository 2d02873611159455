// ============================================================================
// Key Store
// ============================================================================
//
// Maps a location ID to its key record. The cloud keeps its own keypair plus
// every client's public key. An agent keeps its own keypair plus the cloud's
// public key.
//
// Backends:
// - memory.rs: HashMap, for tests
// - file.rs:   one `<id>.json` per party, atomic replace
// - redis.rs:  JSON string per party plus an index set
// ============================================================================

mod file;
mod memory;
mod redis;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;
pub use self::redis::RedisKeyStore;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bridge_crypto::{keys, CryptoError, KeyPair, RsaPublicKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("invalid location id: {0}")]
    InvalidId(String),

    #[error("key store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt key record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key store backend error: {0}")]
    Backend(String),
}

/// Key material and rotation state of one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// SPKI PEM
    pub public_key: String,

    /// PKCS#8 PEM. Only present for the owning party's own entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    pub last_key_rotation_time: DateTime<Utc>,

    #[serde(default)]
    pub force_rotation: bool,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl KeyRecord {
    /// Record for a party we hold the private key of.
    pub fn from_keypair(pair: &KeyPair) -> Result<Self, CryptoError> {
        Ok(Self {
            public_key: pair.public_key_pem()?,
            private_key: Some(pair.private_key_pem()?),
            last_key_rotation_time: Utc::now(),
            force_rotation: false,
            metadata: BTreeMap::new(),
        })
    }

    /// Record for a remote party. The PEM is validated and normalized.
    pub fn from_public_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = keys::parse_public_key_pem(pem)?;
        Ok(Self {
            public_key: keys::public_key_pem(&key)?,
            private_key: None,
            last_key_rotation_time: Utc::now(),
            force_rotation: false,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn public_key(&self) -> Result<RsaPublicKey, CryptoError> {
        keys::parse_public_key_pem(&self.public_key)
    }

    /// `None` when this record only carries a public key.
    pub fn keypair(&self) -> Option<Result<KeyPair, CryptoError>> {
        self.private_key.as_deref().map(KeyPair::from_private_pem)
    }

    /// The proactive rotation gate: forced, or older than `timeout`.
    pub fn rotation_due(&self, now: DateTime<Utc>, timeout: Option<Duration>) -> bool {
        if self.force_rotation {
            return true;
        }
        let Some(timeout) = timeout else {
            return false;
        };
        match now.signed_duration_since(self.last_key_rotation_time).to_std() {
            Ok(age) => age >= timeout,
            // Rotation time in the future: not due
            Err(_) => false,
        }
    }
}

/// Persistence contract for key records.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<KeyRecord>, KeyStoreError>;

    /// Insert or atomically replace.
    async fn put(&self, id: &str, record: &KeyRecord) -> Result<(), KeyStoreError>;

    /// True when an entry was removed.
    async fn delete(&self, id: &str) -> Result<bool, KeyStoreError>;

    async fn list_ids(&self) -> Result<Vec<String>, KeyStoreError>;
}

pub(crate) fn check_id(id: &str) -> Result<(), KeyStoreError> {
    bridge_types::LocationId::parse(id)
        .map(|_| ())
        .map_err(|e| KeyStoreError::InvalidId(format!("{:?}: {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record_aged(hours: i64) -> KeyRecord {
        KeyRecord {
            public_key: String::new(),
            private_key: None,
            last_key_rotation_time: Utc::now() - ChronoDuration::hours(hours),
            force_rotation: false,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_rotation_due_by_age() {
        let day = Some(Duration::from_secs(24 * 3600));
        assert!(!record_aged(1).rotation_due(Utc::now(), day));
        assert!(record_aged(25).rotation_due(Utc::now(), day));
        assert!(!record_aged(1000).rotation_due(Utc::now(), None));
    }

    #[test]
    fn test_rotation_due_when_forced() {
        let mut record = record_aged(0);
        record.force_rotation = true;
        assert!(record.rotation_due(Utc::now(), None));
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(record_aged(0).with_metadata("premID", "site-a")).unwrap();
        assert!(json.get("publicKey").is_some());
        assert!(json.get("privateKey").is_none());
        assert!(json.get("lastKeyRotationTime").is_some());
        assert_eq!(json["forceRotation"], false);
        assert_eq!(json["metadata"]["premID"], "site-a");
    }

    #[test]
    fn test_check_id() {
        assert!(check_id("loc-7").is_ok());
        assert!(check_id("../../etc/passwd").is_err());
        assert!(check_id("").is_err());
    }
}
