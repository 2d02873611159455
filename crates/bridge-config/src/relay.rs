// ============================================================================
// Relay (on-prem agent) Configuration
// ============================================================================

use std::time::Duration;

use anyhow::Result;

use crate::constants::*;
use crate::{parse_or, var_or, Lookup};

/// Which relay transport the agent runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Batched POST pushes plus a long-poll loop
    Rest,
    /// One persistent socket
    WebSocket,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub transport: TransportKind,
    /// Base URL of the cloud service, e.g. "https://bridge.example.com"
    pub server_url: String,
    pub max_batch_size: usize,
    pub max_batch_wait: Duration,
    /// Server-side wait requested per long-poll attempt
    pub poll_timeout: Duration,
    /// Default timeout for every other HTTP call
    pub http_timeout: Duration,
    /// Local subject patterns forwarded to the cloud
    pub forward_subjects: Vec<String>,
    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
    /// Identity to reuse instead of registering. Must exist in the key store.
    pub location_id: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Rest,
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_wait: Duration::from_millis(DEFAULT_MAX_BATCH_WAIT_MS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            forward_subjects: vec![">".to_string()],
            reconnect_initial_backoff: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            reconnect_max_backoff: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            location_id: None,
        }
    }
}

impl RelayConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let transport = match var_or(env, "BRIDGE_TRANSPORT", "rest").to_lowercase().as_str() {
            "rest" | "http" => TransportKind::Rest,
            "websocket" | "ws" => TransportKind::WebSocket,
            other => anyhow::bail!("BRIDGE_TRANSPORT must be 'rest' or 'websocket', got {:?}", other),
        };

        let max_batch_size = parse_or(env, "BRIDGE_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?;
        if max_batch_size == 0 {
            anyhow::bail!("BRIDGE_MAX_BATCH_SIZE must be at least 1");
        }

        let forward_subjects: Vec<String> = var_or(env, "BRIDGE_FORWARD_SUBJECTS", ">")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            transport,
            server_url: var_or(env, "BRIDGE_SERVER_URL", DEFAULT_SERVER_URL)
                .trim_end_matches('/')
                .to_string(),
            max_batch_size,
            max_batch_wait: Duration::from_millis(parse_or(
                env,
                "BRIDGE_MAX_BATCH_WAIT_MS",
                DEFAULT_MAX_BATCH_WAIT_MS,
            )?),
            poll_timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_POLL_TIMEOUT_SECS",
                DEFAULT_POLL_TIMEOUT_SECS,
            )?),
            http_timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            forward_subjects: if forward_subjects.is_empty() {
                vec![">".to_string()]
            } else {
                forward_subjects
            },
            reconnect_initial_backoff: Duration::from_millis(parse_or(
                env,
                "BRIDGE_RECONNECT_INITIAL_MS",
                DEFAULT_RECONNECT_INITIAL_MS,
            )?),
            reconnect_max_backoff: Duration::from_millis(parse_or(
                env,
                "BRIDGE_RECONNECT_MAX_MS",
                DEFAULT_RECONNECT_MAX_MS,
            )?),
            location_id: env("BRIDGE_LOCATION_ID").filter(|v| !v.trim().is_empty()),
        })
    }

    /// Full websocket URL derived from `server_url`.
    pub fn websocket_url(&self, path: &str) -> String {
        let base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.server_url.clone()
        };
        format!("{}{}", base, path)
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Credentials the agent presents when it registers for the first time.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    /// Installation name chosen by the operator
    pub prem_id: String,
    pub user_id: String,
    pub secret: String,
    pub timeout: Duration,
    /// Server-side wait for the auth backend reply
    pub auth_timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            prem_id: String::new(),
            user_id: String::new(),
            secret: String::new(),
            timeout: Duration::from_secs(DEFAULT_REGISTRATION_TIMEOUT_SECS),
            auth_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
        }
    }
}

impl RegistrationConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            prem_id: var_or(env, "BRIDGE_PREM_ID", ""),
            user_id: var_or(env, "BRIDGE_USER_ID", ""),
            secret: var_or(env, "BRIDGE_SECRET", ""),
            timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_REGISTRATION_TIMEOUT_SECS",
                DEFAULT_REGISTRATION_TIMEOUT_SECS,
            )?),
            auth_timeout: Duration::from_secs(parse_or(
                env,
                "BRIDGE_AUTH_TIMEOUT_SECS",
                DEFAULT_AUTH_TIMEOUT_SECS,
            )?),
        })
    }
}
