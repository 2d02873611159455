//! Redis client implementation with connection management

use crate::Result;
use redis::aio::{ConnectionManager, PubSub};

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    /// Get connection manager (for advanced operations)
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Open a dedicated pub/sub connection. Pub/sub connections cannot share
    /// the multiplexed manager.
    pub async fn pubsub(&self) -> Result<PubSub> {
        self.client.get_async_pubsub().await
    }

    /// PING - Liveness check
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET").arg(key).query_async(&mut conn).await
    }

    /// SET - Set key to value
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// SET NX EX - Claim a key for `seconds`. True when this caller won.
    pub async fn set_nx_ex(&self, key: &str, value: &str, seconds: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// DEL - Delete a key, returns the number of keys removed
    pub async fn del(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async(&mut conn).await
    }

    /// EXISTS - Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("EXISTS").arg(key).query_async(&mut conn).await
    }

    // ============================================================================
    // List Operations
    // ============================================================================

    /// RPUSH - Append values to the tail of a list, returns the new length
    pub async fn rpush(&self, key: &str, values: &[String]) -> Result<i64> {
        if values.is_empty() {
            return self.llen(key).await;
        }
        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(key)
            .arg(values)
            .query_async(&mut conn)
            .await
    }

    /// LPOP key count - Pop up to `count` values from the head (Redis >= 6.2)
    pub async fn lpop_many(&self, key: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Option<Vec<String>> = redis::cmd("LPOP")
            .arg(key)
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(values.unwrap_or_default())
    }

    /// LLEN - Get list length
    pub async fn llen(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN").arg(key).query_async(&mut conn).await
    }

    // ============================================================================
    // Set Operations
    // ============================================================================

    /// SADD - Add member to set
    pub async fn sadd(&self, key: &str, member: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
    }

    /// SREM - Remove member from set
    pub async fn srem(&self, key: &str, member: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
    }

    /// SMEMBERS - All members of a set
    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("SMEMBERS").arg(key).query_async(&mut conn).await
    }

    // ============================================================================
    // Pub/Sub
    // ============================================================================

    /// PUBLISH - returns the number of receiving subscribers
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
    }
}
