use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// BusMessage - the plain payload carried inside every envelope
// ============================================================================

/// Header naming the party whose relay injected a message into a local bus.
pub const ORIGIN_HEADER: &str = "Bridge-Origin";

/// Prefix of process-local reply inboxes. Never bridged.
pub const INBOX_PREFIX: &str = "_INBOX.";

/// A pub/sub message, identical in shape on both sides of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Raw payload, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            reply_to: None,
            data: data.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Party that injected this message, if it came across the bridge.
    pub fn origin(&self) -> Option<&str> {
        self.headers.get(ORIGIN_HEADER).map(String::as_str)
    }

    pub fn set_origin(&mut self, origin: &str) {
        self.headers
            .insert(ORIGIN_HEADER.to_string(), origin.to_string());
    }

    /// True for `_INBOX.` reply subjects.
    pub fn is_inbox(&self) -> bool {
        self.subject.starts_with(INBOX_PREFIX)
    }

    /// Payload as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let msg = BusMessage::new("svc.echo", "ping").with_reply_to("resp.1");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["subject"], "svc.echo");
        assert_eq!(json["replyTo"], "resp.1");
        assert_eq!(json["data"], "cGluZw==");
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn test_minimal_json_parses() {
        let msg = BusMessage::from_json_bytes(br#"{"subject":"a.b","data":""}"#).unwrap();
        assert_eq!(msg.subject, "a.b");
        assert!(msg.reply_to.is_none());
        assert!(msg.data.is_empty());
        assert!(msg.origin().is_none());
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(BusMessage::from_json_bytes(br#"{"subject":"a","data":"!!"}"#).is_err());
    }

    #[test]
    fn test_origin_and_inbox() {
        let mut msg = BusMessage::new("_INBOX.abc", Vec::new());
        assert!(msg.is_inbox());
        msg.set_origin("loc-7");
        assert_eq!(msg.origin(), Some("loc-7"));
        assert_eq!(msg.headers.get(ORIGIN_HEADER).unwrap(), "loc-7");
    }
}
