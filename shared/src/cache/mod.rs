// ============================================================================
// Message Cache
// ============================================================================
//
// Per-client FIFO of serialized bridged messages waiting to be pulled. The
// cloud fills it when a WebSocket writer fails mid-send; pull and the
// WebSocket writer drain it before reading the live subscription.
//
// Backends:
// - memory.rs: VecDeque per client with a size cap
// - redis.rs:  one Redis list per client
// ============================================================================

mod memory;
mod redis;

pub use memory::MemoryMessageCache;
pub use self::redis::RedisMessageCache;

use async_trait::async_trait;
use thiserror::Error;

/// Memory backend cap per client. The oldest entries go first.
pub const DEFAULT_MAX_ENTRIES_PER_CLIENT: usize = 10_000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait MessageCache: Send + Sync {
    /// Append to the back of the client's queue, preserving order.
    async fn push(&self, client_id: &str, entries: Vec<String>) -> Result<(), CacheError>;

    /// Remove and return up to `max` entries from the front.
    async fn pop(&self, client_id: &str, max: usize) -> Result<Vec<String>, CacheError>;

    async fn len(&self, client_id: &str) -> Result<usize, CacheError>;

    async fn clear(&self, client_id: &str) -> Result<(), CacheError>;
}
