// ============================================================================
// Configuration Constants
// ============================================================================

// Network
pub(crate) const DEFAULT_PORT: u16 = 8080;
pub(crate) const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

// Identity
pub const DEFAULT_CLOUD_ID: &str = "cloud";
pub(crate) const DEFAULT_KEY_BITS: usize = 2048;

// Bus subjects
pub(crate) const DEFAULT_CLIENT_PREFIX: &str = "bridge.client";
pub(crate) const DEFAULT_LIFECYCLE_PREFIX: &str = "bridge.lifecycle";
pub(crate) const DEFAULT_AUTH_SUBJECT: &str = "bridge.auth.validate";
pub(crate) const DEFAULT_QUEUE_GROUP: &str = "bridge-cloud";

// Redis key prefixes
pub(crate) const DEFAULT_BUS_CHANNEL_PREFIX: &str = "bridge:bus:";
pub(crate) const DEFAULT_KEY_PREFIX: &str = "bridge:keys:";
pub(crate) const DEFAULT_CACHE_PREFIX: &str = "bridge:cache:";
pub(crate) const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub(crate) const DEFAULT_KEY_STORE_PATH: &str = "./keys";

// Timeouts (seconds unless noted)
pub(crate) const DEFAULT_CHALLENGE_MAX_AGE_SECS: u64 = 300;
pub(crate) const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
pub(crate) const MAX_POLL_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;
pub(crate) const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
pub(crate) const DEFAULT_BUS_CONNECT_ATTEMPTS: u32 = 10;

// Batching
pub(crate) const DEFAULT_MAX_BATCH_SIZE: usize = 512;
pub(crate) const DEFAULT_MAX_BATCH_WAIT_MS: u64 = 5;
pub(crate) const DEFAULT_PULL_LIMIT: usize = 100;

// Maximum HTTP body accepted by the cloud service (8 MB)
pub const MAX_REQUEST_BODY_SIZE: usize = 8 * 1024 * 1024;
