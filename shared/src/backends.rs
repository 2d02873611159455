// ============================================================================
// Backend Wiring
// ============================================================================
//
// Turns configuration into injected handles: the message bus, the key store
// and the message cache. Redis connections go through `connect_with_retry`
// so a service that starts before Redis does not crash-loop.
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_config::{BusBackend, BusConfig, CacheBackend, KeyStoreBackend, StorageConfig};
use bridge_redis::RedisClient;

use crate::bus::{MemoryBus, MessageBus, RedisBus};
use crate::cache::{MemoryMessageCache, MessageCache, RedisMessageCache};
use crate::keystore::{FileKeyStore, KeyStore, MemoryKeyStore, RedisKeyStore};
use crate::retry::connect_with_retry;

pub async fn connect_bus(config: &BusConfig) -> Result<Arc<dyn MessageBus>> {
    match config.backend {
        BusBackend::Memory => {
            tracing::info!("Using in-process message bus");
            Ok(Arc::new(MemoryBus::new()))
        }
        BusBackend::Redis => {
            tracing::info!(url = %redact_url(&config.redis_url), "Connecting message bus to Redis");
            let bus = connect_with_retry(
                "bus_connect",
                config.connect_attempts,
                config.connect_initial_backoff,
                || RedisBus::connect(&config.redis_url, &config.channel_prefix),
            )
            .await
            .context("failed to connect message bus")?;
            Ok(Arc::new(bus))
        }
    }
}

/// Key store and message cache handles.
pub struct Storage {
    pub key_store: Arc<dyn KeyStore>,
    pub cache: Arc<dyn MessageCache>,
}

pub async fn open_storage(config: &StorageConfig, bus: &BusConfig) -> Result<Storage> {
    let redis = if config.needs_redis() {
        tracing::info!(url = %redact_url(&config.redis_url), "Connecting storage to Redis");
        let client = connect_with_retry(
            "storage_connect",
            bus.connect_attempts,
            bus.connect_initial_backoff,
            || async {
                let client = RedisClient::connect(&config.redis_url).await?;
                client.ping().await?;
                Ok::<_, bridge_redis::RedisError>(client)
            },
        )
        .await
        .context("failed to connect storage Redis")?;
        Some(client)
    } else {
        None
    };

    let key_store: Arc<dyn KeyStore> = match (config.key_store, &redis) {
        (KeyStoreBackend::Memory, _) => Arc::new(MemoryKeyStore::new()),
        (KeyStoreBackend::File, _) => Arc::new(
            FileKeyStore::open(&config.key_store_path)
                .await
                .with_context(|| format!("failed to open key store at {}", config.key_store_path.display()))?,
        ),
        (KeyStoreBackend::Redis, Some(client)) => {
            Arc::new(RedisKeyStore::new(client.clone(), config.key_prefix.clone()))
        }
        (KeyStoreBackend::Redis, None) => anyhow::bail!("Redis key store without a Redis connection"),
    };

    let cache: Arc<dyn MessageCache> = match (config.cache, &redis) {
        (CacheBackend::Memory, _) => Arc::new(MemoryMessageCache::new()),
        (CacheBackend::Redis, Some(client)) => {
            Arc::new(RedisMessageCache::new(client.clone(), config.cache_prefix.clone()))
        }
        (CacheBackend::Redis, None) => anyhow::bail!("Redis message cache without a Redis connection"),
    };

    tracing::info!(
        key_store = ?config.key_store,
        cache = ?config.cache,
        "Storage backends ready"
    );
    Ok(Storage { key_store, cache })
}

/// Hide credentials in a Redis URL before logging it.
pub fn redact_url(url: &str) -> String {
    match url.find('@') {
        Some(at_pos) => {
            let protocol_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            format!("{}***{}", &url[..protocol_end], &url[at_pos..])
        }
        None => url.to_string(),
    }
}
