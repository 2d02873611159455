// ============================================================================
// Message Bus Configuration
// ============================================================================

use std::time::Duration;

use anyhow::Result;

use crate::constants::*;
use crate::{parse_or, var_or, Lookup};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusBackend {
    /// In-process bus, single-process deployments and tests
    Memory,
    /// Redis pub/sub
    Redis,
}

#[derive(Clone, Debug)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub redis_url: String,
    /// Prepended to every subject to form the Redis channel name
    pub channel_prefix: String,
    /// Connection attempts at startup before giving up
    pub connect_attempts: u32,
    pub connect_initial_backoff: Duration,
    /// Reply wait for requests relayed onto the local bus
    pub request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            channel_prefix: DEFAULT_BUS_CHANNEL_PREFIX.to_string(),
            connect_attempts: DEFAULT_BUS_CONNECT_ATTEMPTS,
            connect_initial_backoff: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl BusConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let backend = match var_or(env, "BRIDGE_BUS_BACKEND", "memory").to_lowercase().as_str() {
            "memory" => BusBackend::Memory,
            "redis" => BusBackend::Redis,
            other => anyhow::bail!("BRIDGE_BUS_BACKEND must be 'memory' or 'redis', got {:?}", other),
        };
        let redis_url = env("BRIDGE_BUS_REDIS_URL")
            .or_else(|| env("REDIS_URL"))
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

        Ok(Self {
            backend,
            redis_url,
            channel_prefix: var_or(env, "BRIDGE_BUS_CHANNEL_PREFIX", DEFAULT_BUS_CHANNEL_PREFIX),
            connect_attempts: parse_or(env, "BRIDGE_BUS_CONNECT_ATTEMPTS", DEFAULT_BUS_CONNECT_ATTEMPTS)?,
            connect_initial_backoff: Duration::from_millis(parse_or(
                env,
                "BRIDGE_BUS_CONNECT_BACKOFF_MS",
                DEFAULT_RECONNECT_INITIAL_MS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
        })
    }
}

// ============================================================================
// Subject Layout
// ============================================================================

/// Subject names the bridge publishes and subscribes to.
#[derive(Clone, Debug)]
pub struct SubjectConfig {
    /// Per-client subjects: "<client_prefix>.<locationID>.<subject>"
    pub client_prefix: String,
    /// Lifecycle events: "<lifecycle_prefix>.client.added" etc.
    pub lifecycle_prefix: String,
    /// Auth backend request subject used during registration
    pub auth_subject: String,
    /// Queue group shared by every cloud instance
    pub queue_group: String,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            client_prefix: DEFAULT_CLIENT_PREFIX.to_string(),
            lifecycle_prefix: DEFAULT_LIFECYCLE_PREFIX.to_string(),
            auth_subject: DEFAULT_AUTH_SUBJECT.to_string(),
            queue_group: DEFAULT_QUEUE_GROUP.to_string(),
        }
    }
}

impl SubjectConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Self {
        Self {
            client_prefix: var_or(env, "BRIDGE_CLIENT_SUBJECT_PREFIX", DEFAULT_CLIENT_PREFIX),
            lifecycle_prefix: var_or(env, "BRIDGE_LIFECYCLE_SUBJECT_PREFIX", DEFAULT_LIFECYCLE_PREFIX),
            auth_subject: var_or(env, "BRIDGE_AUTH_SUBJECT", DEFAULT_AUTH_SUBJECT),
            queue_group: var_or(env, "BRIDGE_QUEUE_GROUP", DEFAULT_QUEUE_GROUP),
        }
    }

    /// Subject a cloud-side publisher uses to reach `subject` on `location_id`.
    pub fn client_subject(&self, location_id: &str, subject: &str) -> String {
        format!("{}.{}.{}", self.client_prefix, location_id, subject)
    }

    /// Wildcard covering everything addressed to `location_id`.
    pub fn client_pattern(&self, location_id: &str) -> String {
        format!("{}.{}.>", self.client_prefix, location_id)
    }

    /// Strip "<client_prefix>.<location_id>." from a subject, returning the
    /// subject as the client should see it.
    pub fn strip_client_prefix<'a>(&self, location_id: &str, subject: &'a str) -> Option<&'a str> {
        subject
            .strip_prefix(self.client_prefix.as_str())?
            .strip_prefix('.')?
            .strip_prefix(location_id)?
            .strip_prefix('.')
            .filter(|rest| !rest.is_empty())
    }

    pub fn client_added(&self) -> String {
        format!("{}.client.added", self.lifecycle_prefix)
    }

    pub fn client_removed(&self) -> String {
        format!("{}.client.removed", self.lifecycle_prefix)
    }

    pub fn account_removed(&self) -> String {
        format!("{}.account.removed", self.lifecycle_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_subjects() {
        let subjects = SubjectConfig::default();
        assert_eq!(
            subjects.client_subject("loc-7", "resp.1"),
            "bridge.client.loc-7.resp.1"
        );
        assert_eq!(subjects.client_pattern("loc-7"), "bridge.client.loc-7.>");
        assert_eq!(
            subjects.strip_client_prefix("loc-7", "bridge.client.loc-7.svc.echo"),
            Some("svc.echo")
        );
        assert_eq!(subjects.strip_client_prefix("loc-7", "bridge.client.loc-70.x"), None);
        assert_eq!(subjects.strip_client_prefix("loc-7", "bridge.client.loc-7."), None);
    }

    #[test]
    fn test_lifecycle_subjects() {
        let subjects = SubjectConfig::default();
        assert_eq!(subjects.client_added(), "bridge.lifecycle.client.added");
        assert_eq!(subjects.client_removed(), "bridge.lifecycle.client.removed");
        assert_eq!(subjects.account_removed(), "bridge.lifecycle.account.removed");
    }

    #[test]
    fn test_bus_redis_url_falls_back_to_redis_url() {
        let env = crate::lookup_from(&[
            ("BRIDGE_BUS_BACKEND", "redis"),
            ("REDIS_URL", "redis://cache:6379"),
        ]);
        let bus = BusConfig::from_lookup(&env).unwrap();
        assert_eq!(bus.backend, BusBackend::Redis);
        assert_eq!(bus.redis_url, "redis://cache:6379");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let env = crate::lookup_from(&[("BRIDGE_BUS_BACKEND", "nats")]);
        assert!(BusConfig::from_lookup(&env).is_err());
    }
}
