// ============================================================================
// Cloud Service Configuration
// ============================================================================

use std::time::Duration;

use anyhow::Result;

use crate::constants::*;
use crate::{parse_or, var_or, Lookup};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// "host:port" the HTTP listener binds to
    pub bind_address: String,
    pub port: u16,
    /// Long-poll wait when the client does not ask for one
    pub default_poll_timeout: Duration,
    /// Upper bound on any client-requested long-poll wait
    pub max_poll_timeout: Duration,
    /// Messages returned per pull when the client does not ask for a limit
    pub pull_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("{}:{}", DEFAULT_BIND_HOST, DEFAULT_PORT),
            port: DEFAULT_PORT,
            default_poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            max_poll_timeout: Duration::from_secs(MAX_POLL_TIMEOUT_SECS),
            pull_limit: DEFAULT_PULL_LIMIT,
        }
    }
}

impl ServerConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let port = parse_or(env, "PORT", DEFAULT_PORT)?;
        let bind_address = var_or(
            env,
            "BRIDGE_BIND_ADDRESS",
            &format!("{}:{}", DEFAULT_BIND_HOST, port),
        );

        Ok(Self {
            bind_address,
            port,
            default_poll_timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_SERVER_POLL_TIMEOUT_SECS",
                DEFAULT_POLL_TIMEOUT_SECS,
            )?),
            max_poll_timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_SERVER_MAX_POLL_TIMEOUT_SECS",
                MAX_POLL_TIMEOUT_SECS,
            )?),
            pull_limit: parse_or(env, "BRIDGE_PULL_LIMIT", DEFAULT_PULL_LIMIT)?,
        })
    }

    /// Clamp a client-requested wait to the configured bounds.
    pub fn poll_timeout(&self, requested_secs: Option<u64>) -> Duration {
        match requested_secs {
            Some(secs) => Duration::from_secs(secs).min(self.max_poll_timeout),
            None => self.default_poll_timeout,
        }
    }
}
