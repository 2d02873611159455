//! Signed freshness tokens.
//!
//! A challenge is an RFC 3339 timestamp signed by the prover. Verification is
//! stateless and needs only the claimed party's public key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::CryptoResult;
use crate::keys;

/// `{challengeText, challengeSignature}` as carried by privileged calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Timestamp that was signed.
    pub challenge_text: String,
    /// Base64 signature over the UTF-8 bytes of `challenge_text`.
    pub challenge_signature: String,
}

impl AuthChallenge {
    /// Sign the current time.
    pub fn new(private: &RsaPrivateKey) -> CryptoResult<Self> {
        Self::with_text(Utc::now().to_rfc3339(), private)
    }

    /// Sign arbitrary text. Used by tests and by callers that need a fixed
    /// timestamp.
    pub fn with_text(text: impl Into<String>, private: &RsaPrivateKey) -> CryptoResult<Self> {
        let challenge_text = text.into();
        let signature = keys::sign(private, challenge_text.as_bytes())?;
        Ok(Self {
            challenge_text,
            challenge_signature: STANDARD.encode(signature),
        })
    }

    /// True when the signature matches `public`. Any failure is `false`.
    pub fn verify(&self, public: &RsaPublicKey) -> bool {
        let Ok(signature) = STANDARD.decode(&self.challenge_signature) else {
            return false;
        };
        keys::verify(public, self.challenge_text.as_bytes(), &signature).is_ok()
    }

    /// The timestamp in `challenge_text`, when it parses.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.challenge_text)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// True when the timestamp lies within `max_age` of `now`, in either
    /// direction. A zero `max_age` disables the check.
    pub fn is_fresh(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        if max_age.is_zero() {
            return true;
        }
        let Some(issued) = self.issued_at() else {
            return false;
        };
        let Ok(window) = Duration::from_std(max_age) else {
            return true;
        };
        let skew = now.signed_duration_since(issued);
        skew <= window && skew >= -window
    }

    /// Signature check plus the optional freshness window.
    pub fn validate(&self, public: &RsaPublicKey, max_age: std::time::Duration) -> bool {
        self.is_fresh(max_age, Utc::now()) && self.verify(public)
    }
}
