//! Round-trip markers for echo subjects (`echo` or `<anything>.echo`).
//!
//! Each hop appends ` | <marker>` to the payload so a test can see the full
//! path: `ping | client:loc-7 | server:cloud | handler`.

use bridge_types::BusMessage;

pub fn is_echo_subject(subject: &str) -> bool {
    subject == "echo" || subject.ends_with(".echo")
}

/// Append ` | <marker>` when `message` is on an echo subject.
pub fn stamp(message: &mut BusMessage, marker: &str) {
    if is_echo_subject(&message.subject) {
        message.data.extend_from_slice(b" | ");
        message.data.extend_from_slice(marker.as_bytes());
    }
}

pub fn client_marker(client_id: &str) -> String {
    format!("client:{}", client_id)
}

pub fn server_marker(cloud_id: &str) -> String {
    format!("server:{}", cloud_id)
}
