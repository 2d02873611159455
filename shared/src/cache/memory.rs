use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheError, MessageCache, DEFAULT_MAX_ENTRIES_PER_CLIENT};

pub struct MemoryMessageCache {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    max_entries: usize,
}

impl Default for MemoryMessageCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES_PER_CLIENT)
    }
}

impl MemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }
}

#[async_trait]
impl MessageCache for MemoryMessageCache {
    async fn push(&self, client_id: &str, entries: Vec<String>) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(client_id.to_string()).or_default();
        queue.extend(entries);

        let overflow = queue.len().saturating_sub(self.max_entries);
        if overflow > 0 {
            queue.drain(..overflow);
            tracing::warn!(
                location_id = %client_id,
                dropped = overflow,
                "Message cache full, dropping oldest entries"
            );
        }
        Ok(())
    }

    async fn pop(&self, client_id: &str, max: usize) -> Result<Vec<String>, CacheError> {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(client_id) else {
            return Ok(Vec::new());
        };
        let n = max.min(queue.len());
        let out: Vec<String> = queue.drain(..n).collect();
        if queue.is_empty() {
            queues.remove(client_id);
        }
        Ok(out)
    }

    async fn len(&self, client_id: &str) -> Result<usize, CacheError> {
        Ok(self
            .queues
            .lock()
            .await
            .get(client_id)
            .map_or(0, VecDeque::len))
    }

    async fn clear(&self, client_id: &str) -> Result<(), CacheError> {
        self.queues.lock().await.remove(client_id);
        Ok(())
    }
}
