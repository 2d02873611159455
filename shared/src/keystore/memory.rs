use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_id, KeyRecord, KeyStore, KeyStoreError};

#[derive(Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<String, KeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, id: &str) -> Result<Option<KeyRecord>, KeyStoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, id: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        check_id(id)?;
        self.records
            .write()
            .await
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, KeyStoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list_ids(&self) -> Result<Vec<String>, KeyStoreError> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
