//! Redis list per client: `RPUSH` to append, `LPOP count` to drain.

use async_trait::async_trait;
use bridge_redis::RedisClient;

use super::{CacheError, MessageCache};

#[derive(Clone)]
pub struct RedisMessageCache {
    client: RedisClient,
    prefix: String,
}

impl RedisMessageCache {
    pub fn new(client: RedisClient, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn key(&self, client_id: &str) -> String {
        format!("{}{}", self.prefix, client_id)
    }
}

fn backend(e: bridge_redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

#[async_trait]
impl MessageCache for RedisMessageCache {
    async fn push(&self, client_id: &str, entries: Vec<String>) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.client
            .rpush(&self.key(client_id), &entries)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn pop(&self, client_id: &str, max: usize) -> Result<Vec<String>, CacheError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        self.client
            .lpop_many(&self.key(client_id), max)
            .await
            .map_err(backend)
    }

    async fn len(&self, client_id: &str) -> Result<usize, CacheError> {
        let len = self
            .client
            .llen(&self.key(client_id))
            .await
            .map_err(backend)?;
        Ok(usize::try_from(len).unwrap_or(0))
    }

    async fn clear(&self, client_id: &str) -> Result<(), CacheError> {
        self.client
            .del(&self.key(client_id))
            .await
            .map_err(backend)?;
        Ok(())
    }
}
