// ============================================================================
// Wire DTOs
// ============================================================================
//
// JSON bodies exchanged between the on-prem agent and the cloud service, the
// lifecycle events published on the bus, and the reserved codes both sides
// must agree on.
// ============================================================================

use bridge_crypto::{AuthChallenge, Envelope};
use serde::{Deserialize, Serialize};

/// Reserved HTTP status meaning "certificate invalid, rotate and retry".
pub const CERTIFICATE_INVALID_STATUS: u16 = 495;

/// WebSocket close code carrying the same meaning mid-session.
pub const CERTIFICATE_INVALID_CLOSE_CODE: u16 = 4495;

/// Only bridged-message format understood today.
pub const MESSAGE_FORMAT_VERSION: u32 = 1;

pub const LOCATION_HEADER: &str = "x-bridge-location-id";
pub const CHALLENGE_HEADER: &str = "x-bridge-challenge";
pub const CHALLENGE_SIGNATURE_HEADER: &str = "x-bridge-challenge-signature";

pub const REGISTER_PATH: &str = "/api/v1/register";
pub const ROTATE_PATH: &str = "/api/v1/certificate/rotate";
pub const MESSAGE_QUEUE_PATH: &str = "/api/v1/message-queue";
pub const MESSAGE_QUEUE_WS_PATH: &str = "/api/v1/message-queue/ws";
pub const HEALTH_PATH: &str = "/health";

// ============================================================================
// Message queue
// ============================================================================

/// One envelope in transit. `client_id` always names the on-prem party,
/// whichever direction the message travels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgedMessage {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub format_version: u32,
    /// JSON-encoded [`Envelope`].
    pub envelope: String,
}

impl BridgedMessage {
    pub fn new(client_id: impl Into<String>, envelope: &Envelope) -> bridge_crypto::CryptoResult<Self> {
        Ok(Self {
            client_id: client_id.into(),
            format_version: MESSAGE_FORMAT_VERSION,
            envelope: envelope.to_json()?,
        })
    }
}

/// Batch push body (REST) and client-to-server WebSocket frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub auth_challenge: AuthChallenge,
    pub messages: Vec<BridgedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub accepted: usize,
}

/// Query string of the long-poll endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullQuery {
    /// Seconds to wait for the first message.
    pub timeout: Option<u64>,
    pub limit: Option<usize>,
}

// ============================================================================
// Registration and rotation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[serde(rename = "premID")]
    pub prem_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub secret: String,
    /// Client public key PEM.
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub cloud_public_key: String,
    #[serde(rename = "locationID")]
    pub location_id: String,
}

/// `prem_id` is the rotating client's location ID. The envelope carries the
/// new public key PEM sealed with the old key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRequest {
    #[serde(rename = "premID")]
    pub prem_id: String,
    pub public_key_envelope: Envelope,
    pub auth_challenge: AuthChallenge,
}

// ============================================================================
// Bus payloads
// ============================================================================

/// Body of `client.added`, `client.removed` and `account.removed` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "locationID")]
    pub location_id: String,
}

/// Credentials forwarded to the auth backend during registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBackendRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub secret: String,
    #[serde(rename = "premID")]
    pub prem_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBackendReply {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridged_message_field_names() {
        let msg = BridgedMessage {
            client_id: "loc-7".into(),
            format_version: MESSAGE_FORMAT_VERSION,
            envelope: "{}".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["clientID"], "loc-7");
        assert_eq!(json["formatVersion"], 1);
        assert_eq!(json["envelope"], "{}");
    }

    #[test]
    fn test_registration_field_names() {
        let req: RegistrationRequest = serde_json::from_str(
            r#"{"premID":"site-a","userID":"u1","secret":"s","publicKey":"PEM"}"#,
        )
        .unwrap();
        assert_eq!(req.prem_id, "site-a");
        assert_eq!(req.user_id, "u1");

        let resp = RegistrationResponse {
            cloud_public_key: "PEM".into(),
            location_id: "loc-7".into(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["cloudPublicKey"], "PEM");
        assert_eq!(json["locationID"], "loc-7");
    }

    #[test]
    fn test_auth_reply_reason_optional() {
        let reply: AuthBackendReply = serde_json::from_str(r#"{"valid":true}"#).unwrap();
        assert!(reply.valid);
        assert!(reply.reason.is_none());
    }

    #[test]
    fn test_reserved_codes_disjoint_from_standard_ranges() {
        assert!(CERTIFICATE_INVALID_STATUS > 451 && CERTIFICATE_INVALID_STATUS < 500);
        assert!(CERTIFICATE_INVALID_CLOSE_CODE >= 4000);
    }
}
