// ============================================================================
// Security Configuration
// ============================================================================

use std::time::Duration;

use anyhow::Result;

use crate::constants::*;
use crate::{parse_or, Lookup};

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Key age after which the server demands rotation. `None` disables the
    /// age check (the `forceRotation` flag still applies).
    pub rotation_timeout: Option<Duration>,

    /// Accepted clock distance between a challenge timestamp and now.
    /// Zero disables the freshness check.
    pub challenge_max_age: Duration,

    /// RSA modulus size for newly generated keypairs
    pub key_bits: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rotation_timeout: None,
            challenge_max_age: Duration::from_secs(DEFAULT_CHALLENGE_MAX_AGE_SECS),
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl SecurityConfig {
    pub(crate) fn from_lookup(env: Lookup<'_>) -> Result<Self> {
        let rotation_secs: u64 = parse_or(env, "BRIDGE_ROTATION_TIMEOUT_SECS", 0)?;
        let key_bits = parse_or(env, "BRIDGE_KEY_BITS", DEFAULT_KEY_BITS)?;
        if key_bits < 1024 {
            anyhow::bail!("BRIDGE_KEY_BITS must be at least 1024, got {}", key_bits);
        }

        let challenge_max_age = Duration::from_secs(parse_or(
            env,
            "BRIDGE_CHALLENGE_MAX_AGE_SECS",
            DEFAULT_CHALLENGE_MAX_AGE_SECS,
        )?);
        if challenge_max_age.is_zero() {
            tracing::warn!(
                "SECURITY: BRIDGE_CHALLENGE_MAX_AGE_SECS=0 disables the challenge freshness check. \
                A captured challenge stays valid for as long as the key does."
            );
        }

        Ok(Self {
            rotation_timeout: (rotation_secs > 0).then(|| Duration::from_secs(rotation_secs)),
            challenge_max_age,
            key_bits,
        })
    }
}
