// ============================================================================
// Logging Configuration
// ============================================================================

use anyhow::Result;

use crate::{var_or, Lookup};

/// Output format of the fmt layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// `EnvFilter` directives (`RUST_LOG`)
    pub rust_log: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let format = match var_or(env, "LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got {:?}", other),
        };

        Ok(Self {
            rust_log: var_or(env, "RUST_LOG", "info"),
            format,
        })
    }
}
