//! # Bridge Redis
//!
//! Low-level Redis client for the bus bridge.
//!
//! ## Design Principles
//!
//! - **No business logic** - Pure infrastructure layer
//! - **No dependencies** on other bridge-* crates
//! - **Cheap to share** - every method takes `&self` and clones the
//!   underlying connection manager
//!
//! ## Features
//!
//! - Connection management with automatic reconnection
//! - Key-value operations, including the `SET NX EX` claim
//! - Lists (message cache) and sets (key store index)
//! - Pub/Sub connections (message bus)
//!
//! ## Example
//!
//! ```rust,no_run
//! use bridge_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     client.rpush("bridge:cache:loc-7", &["a".to_string()]).await?;
//!     let popped: Vec<String> = client.lpop_many("bridge:cache:loc-7", 10).await?;
//!
//!     Ok(())
//! }
//! ```

mod client;

pub use client::RedisClient;

// Re-export commonly used types
pub use redis::aio::PubSub;
pub use redis::{Msg, RedisError};

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
