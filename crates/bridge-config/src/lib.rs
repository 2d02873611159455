// ============================================================================
// Bridge Config - Centralized configuration management
// ============================================================================
//
// Configuration shared by the cloud service and the on-prem agent. Values are
// read from environment variables (after loading `.env`) with defaults for
// everything. `Config::default()` yields the same defaults without touching
// the environment, which is what tests use.
//
// ============================================================================

mod bus;
mod constants;
mod logging;
mod relay;
mod security;
mod server;
mod storage;

pub use bus::{BusBackend, BusConfig, SubjectConfig};
pub use constants::{DEFAULT_CLOUD_ID, MAX_REQUEST_BODY_SIZE};
pub use logging::{LogFormat, LoggingConfig};
pub use relay::{RegistrationConfig, RelayConfig, TransportKind};
pub use security::SecurityConfig;
pub use server::ServerConfig;
pub use storage::{CacheBackend, KeyStoreBackend, StorageConfig};

use anyhow::{Context, Result};

/// Variable lookup used by every `from_lookup` constructor.
pub(crate) type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Main configuration structure for bridge services
#[derive(Clone, Debug)]
pub struct Config {
    /// Location ID of the cloud endpoint
    pub cloud_id: String,

    // Sub-configurations
    pub logging: LoggingConfig,
    pub bus: BusConfig,
    pub subjects: SubjectConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub relay: RelayConfig,
    pub registration: RegistrationConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cloud_id: constants::DEFAULT_CLOUD_ID.to_string(),
            logging: LoggingConfig::default(),
            bus: BusConfig::default(),
            subjects: SubjectConfig::default(),
            storage: StorageConfig::default(),
            security: SecurityConfig::default(),
            relay: RelayConfig::default(),
            registration: RegistrationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let cloud_id = var_or(env, "BRIDGE_CLOUD_ID", constants::DEFAULT_CLOUD_ID);
        if cloud_id.is_empty() {
            anyhow::bail!("BRIDGE_CLOUD_ID must not be empty");
        }

        Ok(Self {
            cloud_id,
            logging: LoggingConfig::from_lookup(env)?,
            bus: BusConfig::from_lookup(env)?,
            subjects: SubjectConfig::from_lookup(env),
            storage: StorageConfig::from_lookup(env)?,
            security: SecurityConfig::from_lookup(env)?,
            relay: RelayConfig::from_lookup(env)?,
            registration: RegistrationConfig::from_lookup(env)?,
            server: ServerConfig::from_lookup(env)?,
        })
    }
}

// ============================================================================
// Lookup helpers
// ============================================================================

pub(crate) fn var_or(env: Lookup<'_>, name: &str, default: &str) -> String {
    env(name)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn parse_or<T>(env: Lookup<'_>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: std::collections::HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| map.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_environment_matches_default() {
        let config = Config::from_lookup(&|_: &str| None).unwrap();
        let default = Config::default();

        assert_eq!(config.cloud_id, default.cloud_id);
        assert_eq!(config.relay.max_batch_size, 512);
        assert_eq!(config.relay.max_batch_wait, Duration::from_millis(5));
        assert_eq!(config.server.default_poll_timeout, Duration::from_secs(30));
        assert_eq!(config.security.challenge_max_age, Duration::from_secs(300));
        assert!(config.security.rotation_timeout.is_none());
        assert_eq!(config.relay.forward_subjects, vec![">".to_string()]);
    }

    #[test]
    fn test_overrides_are_applied() {
        let env = lookup_from(&[
            ("BRIDGE_CLOUD_ID", "cloud-eu"),
            ("BRIDGE_TRANSPORT", "websocket"),
            ("BRIDGE_MAX_BATCH_SIZE", "64"),
            ("BRIDGE_ROTATION_TIMEOUT_SECS", "86400"),
            ("BRIDGE_FORWARD_SUBJECTS", "svc.>, events.*"),
            ("PORT", "9090"),
        ]);
        let config = Config::from_lookup(&env).unwrap();

        assert_eq!(config.cloud_id, "cloud-eu");
        assert_eq!(config.relay.transport, TransportKind::WebSocket);
        assert_eq!(config.relay.max_batch_size, 64);
        assert_eq!(
            config.security.rotation_timeout,
            Some(Duration::from_secs(86400))
        );
        assert_eq!(config.relay.forward_subjects, vec!["svc.>", "events.*"]);
        assert_eq!(config.server.bind_address, "0.0.0.0:9090");
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let env = lookup_from(&[("BRIDGE_MAX_BATCH_SIZE", "lots")]);
        let err = Config::from_lookup(&env).unwrap_err();
        assert!(err.to_string().contains("BRIDGE_MAX_BATCH_SIZE"));
    }
}
