// ============================================================================
// Key Store and Message Cache Configuration
// ============================================================================

use std::path::PathBuf;

use anyhow::Result;

use crate::constants::*;
use crate::{var_or, Lookup};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStoreBackend {
    Memory,
    /// One JSON file per party under `key_store_path`
    File,
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub key_store: KeyStoreBackend,
    pub key_store_path: PathBuf,
    pub cache: CacheBackend,
    pub redis_url: String,
    /// Redis key prefix for key records: "bridge:keys:{locationID}"
    pub key_prefix: String,
    /// Redis key prefix for cached messages: "bridge:cache:{locationID}"
    pub cache_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_store: KeyStoreBackend::File,
            key_store_path: PathBuf::from(DEFAULT_KEY_STORE_PATH),
            cache: CacheBackend::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
        }
    }
}

impl StorageConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let key_store = match var_or(env, "BRIDGE_KEY_STORE", "file").to_lowercase().as_str() {
            "memory" => KeyStoreBackend::Memory,
            "file" => KeyStoreBackend::File,
            "redis" => KeyStoreBackend::Redis,
            other => anyhow::bail!(
                "BRIDGE_KEY_STORE must be 'memory', 'file' or 'redis', got {:?}",
                other
            ),
        };
        let cache = match var_or(env, "BRIDGE_CACHE_BACKEND", "memory").to_lowercase().as_str() {
            "memory" => CacheBackend::Memory,
            "redis" => CacheBackend::Redis,
            other => anyhow::bail!(
                "BRIDGE_CACHE_BACKEND must be 'memory' or 'redis', got {:?}",
                other
            ),
        };

        Ok(Self {
            key_store,
            key_store_path: PathBuf::from(var_or(env, "BRIDGE_KEY_STORE_PATH", DEFAULT_KEY_STORE_PATH)),
            cache,
            redis_url: var_or(env, "REDIS_URL", DEFAULT_REDIS_URL),
            key_prefix: var_or(env, "BRIDGE_REDIS_KEY_PREFIX", DEFAULT_KEY_PREFIX),
            cache_prefix: var_or(env, "BRIDGE_REDIS_CACHE_PREFIX", DEFAULT_CACHE_PREFIX),
        })
    }

    /// True when any storage concern needs a Redis connection.
    pub fn needs_redis(&self) -> bool {
        self.key_store == KeyStoreBackend::Redis || self.cache == CacheBackend::Redis
    }
}
