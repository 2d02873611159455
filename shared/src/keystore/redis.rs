//! Key records as JSON strings under `<prefix><id>`, plus the index set
//! `<prefix>index` so `list_ids` needs no `KEYS` scan.

use async_trait::async_trait;
use bridge_redis::RedisClient;

use super::{check_id, KeyRecord, KeyStore, KeyStoreError};

#[derive(Clone)]
pub struct RedisKeyStore {
    client: RedisClient,
    prefix: String,
}

impl RedisKeyStore {
    pub fn new(client: RedisClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}index", self.prefix)
    }
}

fn backend(e: bridge_redis::RedisError) -> KeyStoreError {
    KeyStoreError::Backend(e.to_string())
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn get(&self, id: &str) -> Result<Option<KeyRecord>, KeyStoreError> {
        check_id(id)?;
        match self.client.get(&self.record_key(id)).await.map_err(backend)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, id: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        check_id(id)?;
        let json = serde_json::to_string(record)?;
        self.client
            .set(&self.record_key(id), &json)
            .await
            .map_err(backend)?;
        self.client
            .sadd(&self.index_key(), id)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, KeyStoreError> {
        check_id(id)?;
        let removed = self
            .client
            .del(&self.record_key(id))
            .await
            .map_err(backend)?;
        self.client
            .srem(&self.index_key(), id)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn list_ids(&self) -> Result<Vec<String>, KeyStoreError> {
        let mut ids = self
            .client
            .smembers(&self.index_key())
            .await
            .map_err(backend)?;
        ids.sort();
        Ok(ids)
    }
}
