//! Hybrid RSA/AES envelopes.
//!
//! Each message gets a random 16-byte AES key. The payload is encrypted with
//! AES-128-CBC (random IV prepended, PKCS#7 padding), the AES key is wrapped
//! with the recipient's RSA public key (PKCS#1 v1.5) and the ciphertext bytes
//! are signed with the sender's private key.
//!
//! Version 1 envelopes (AES-128-ECB, no IV) are still readable but never
//! written.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::keys;

/// Legacy ECB envelopes.
pub const ENVELOPE_VERSION_ECB: u32 = 1;
/// CBC envelopes with the IV prepended to the ciphertext.
pub const ENVELOPE_VERSION_CBC: u32 = 2;
/// The only version [`seal`] produces.
pub const CURRENT_ENVELOPE_VERSION: u32 = ENVELOPE_VERSION_CBC;

const AES_KEY_LEN: usize = 16;
const AES_BLOCK_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// One sealed payload. Immutable once built: fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    envelope_version: u32,
    #[serde(rename = "senderID")]
    sender_id: String,
    #[serde(rename = "recipientID")]
    recipient_id: String,
    message: String,
    msg_key: String,
    signature: String,
}

impl Envelope {
    /// Wire format version.
    pub fn version(&self) -> u32 {
        self.envelope_version
    }

    /// Party that sealed the envelope.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Party the envelope is addressed to.
    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    /// Base64 ciphertext.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Base64 RSA-wrapped AES key.
    pub fn msg_key(&self) -> &str {
        &self.msg_key
    }

    /// Base64 signature over the ciphertext bytes.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Serialize to the JSON string carried inside a bridged message.
    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CryptoError::Decode(format!("failed to encode envelope: {}", e)))
    }

    /// Parse the JSON string carried inside a bridged message.
    pub fn from_json(json: &str) -> CryptoResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CryptoError::Decode(format!("malformed envelope: {}", e)))
    }
}

/// Seal `plain` from `sender_id` to `recipient_id`.
pub fn seal(
    plain: &[u8],
    sender_id: &str,
    recipient_id: &str,
    sender_private: &RsaPrivateKey,
    recipient_public: &RsaPublicKey,
) -> CryptoResult<Envelope> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
    let mut iv = [0u8; AES_BLOCK_LEN];
    OsRng.fill_bytes(key.as_mut());
    OsRng.fill_bytes(&mut iv);

    let encryptor = Aes128CbcEnc::new_from_slices(key.as_ref(), &iv)
        .map_err(|e| CryptoError::Encryption(format!("cipher init failed: {}", e)))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plain);

    let mut message = Vec::with_capacity(AES_BLOCK_LEN + ciphertext.len());
    message.extend_from_slice(&iv);
    message.extend_from_slice(&ciphertext);

    finish(
        ENVELOPE_VERSION_CBC,
        &message,
        key.as_ref(),
        sender_id,
        recipient_id,
        sender_private,
        recipient_public,
    )
}

/// Open an envelope. The message key is unwrapped first, then the signature
/// is checked, and only a verified ciphertext is decrypted.
pub fn open(
    envelope: &Envelope,
    recipient_private: &RsaPrivateKey,
    sender_public: &RsaPublicKey,
) -> CryptoResult<Vec<u8>> {
    if envelope.envelope_version != ENVELOPE_VERSION_ECB
        && envelope.envelope_version != ENVELOPE_VERSION_CBC
    {
        return Err(CryptoError::UnsupportedVersion(envelope.envelope_version));
    }

    let message = decode_field("message", &envelope.message)?;
    let wrapped_key = decode_field("msgKey", &envelope.msg_key)?;
    let signature = decode_field("signature", &envelope.signature)?;

    let key = Zeroizing::new(
        recipient_private
            .decrypt(Pkcs1v15Encrypt, &wrapped_key)
            .map_err(|e| CryptoError::Decode(format!("cannot unwrap message key: {}", e)))?,
    );
    if key.len() != AES_KEY_LEN {
        return Err(CryptoError::Decode(format!(
            "message key has {} bytes, expected {}",
            key.len(),
            AES_KEY_LEN
        )));
    }

    keys::verify(sender_public, &message, &signature)?;

    match envelope.envelope_version {
        ENVELOPE_VERSION_CBC => {
            if message.len() < AES_BLOCK_LEN {
                return Err(CryptoError::Decode("ciphertext shorter than IV".into()));
            }
            let (iv, body) = message.split_at(AES_BLOCK_LEN);
            Aes128CbcDec::new_from_slices(&key, iv)
                .map_err(|e| CryptoError::Decode(format!("cipher init failed: {}", e)))?
                .decrypt_padded_vec_mut::<Pkcs7>(body)
                .map_err(|_| CryptoError::Decode("bad padding".into()))
        }
        _ => Aes128EcbDec::new_from_slice(&key)
            .map_err(|e| CryptoError::Decode(format!("cipher init failed: {}", e)))?
            .decrypt_padded_vec_mut::<Pkcs7>(&message)
            .map_err(|_| CryptoError::Decode("bad padding".into())),
    }
}

fn decode_field(name: &str, value: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Decode(format!("{} is not valid base64: {}", name, e)))
}

fn finish(
    version: u32,
    message: &[u8],
    key: &[u8],
    sender_id: &str,
    recipient_id: &str,
    sender_private: &RsaPrivateKey,
    recipient_public: &RsaPublicKey,
) -> CryptoResult<Envelope> {
    let wrapped_key = recipient_public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key)
        .map_err(|e| CryptoError::Encryption(format!("cannot wrap message key: {}", e)))?;
    let signature = keys::sign(sender_private, message)?;

    Ok(Envelope {
        envelope_version: version,
        sender_id: sender_id.to_string(),
        recipient_id: recipient_id.to_string(),
        message: STANDARD.encode(message),
        msg_key: STANDARD.encode(wrapped_key),
        signature: STANDARD.encode(signature),
    })
}

/// Legacy writer, only used to produce fixtures for the read path.
#[cfg(test)]
pub(crate) fn seal_v1(
    plain: &[u8],
    sender_id: &str,
    recipient_id: &str,
    sender_private: &RsaPrivateKey,
    recipient_public: &RsaPublicKey,
) -> CryptoResult<Envelope> {
    let mut key = [0u8; AES_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    let message = ecb::Encryptor::<Aes128>::new_from_slice(&key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plain);
    finish(
        ENVELOPE_VERSION_ECB,
        &message,
        &key,
        sender_id,
        recipient_id,
        sender_private,
        recipient_public,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys::{alice, bob};

    fn seal_ab(plain: &[u8]) -> Envelope {
        seal(plain, "alice", "bob", alice().private_key(), bob().public_key()).unwrap()
    }

    fn open_ab(envelope: &Envelope) -> CryptoResult<Vec<u8>> {
        open(envelope, bob().private_key(), alice().public_key())
    }

    /// Flip one bit inside a base64 field and re-encode it.
    fn tamper(envelope: &Envelope, field: &str) -> Envelope {
        let mut value = serde_json::to_value(envelope).unwrap();
        let encoded = value[field].as_str().unwrap().to_string();
        let mut bytes = STANDARD.decode(encoded).unwrap();
        let idx = bytes.len() / 2;
        bytes[idx] ^= 0x01;
        value[field] = serde_json::Value::String(STANDARD.encode(bytes));
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_round_trip_various_sizes() {
        for size in [0usize, 1, 15, 16, 17, 1000] {
            let plain: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let envelope = seal_ab(&plain);
            assert_eq!(open_ab(&envelope).unwrap(), plain, "size {}", size);
        }
    }

    #[test]
    fn test_new_envelopes_are_version_2() {
        let envelope = seal_ab(b"ping");
        assert_eq!(envelope.version(), CURRENT_ENVELOPE_VERSION);
        assert_eq!(envelope.sender_id(), "alice");
        assert_eq!(envelope.recipient_id(), "bob");

        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"envelopeVersion\":2"));
        assert!(json.contains("\"senderID\":\"alice\""));
        assert!(json.contains("\"recipientID\":\"bob\""));
        assert!(json.contains("\"msgKey\""));
        assert_eq!(Envelope::from_json(&json).unwrap(), envelope);
    }

    #[test]
    fn test_tampered_ciphertext_is_integrity_error() {
        let envelope = tamper(&seal_ab(b"transfer 100 to alice"), "message");
        assert!(matches!(open_ab(&envelope), Err(CryptoError::Integrity)));
    }

    #[test]
    fn test_tampered_signature_is_integrity_error() {
        let envelope = tamper(&seal_ab(b"transfer 100 to alice"), "signature");
        assert!(matches!(open_ab(&envelope), Err(CryptoError::Integrity)));
    }

    #[test]
    fn test_wrong_sender_key_is_integrity_error() {
        let envelope = seal_ab(b"hello");
        let result = open(&envelope, bob().private_key(), bob().public_key());
        assert!(result.unwrap_err().is_integrity());
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let envelope = seal_ab(b"hello");
        assert!(open(&envelope, alice().private_key(), alice().public_key()).is_err());
    }

    #[test]
    fn test_version_1_still_decodes() {
        let plain = b"legacy payload from an old agent";
        let v1 = seal_v1(plain, "alice", "bob", alice().private_key(), bob().public_key()).unwrap();
        let v2 = seal_ab(plain);

        assert_eq!(v1.version(), ENVELOPE_VERSION_ECB);
        assert_eq!(open_ab(&v1).unwrap(), plain);
        assert_eq!(open_ab(&v2).unwrap(), plain);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut value = serde_json::to_value(seal_ab(b"x")).unwrap();
        value["envelopeVersion"] = serde_json::json!(7);
        let envelope: Envelope = serde_json::from_value(value).unwrap();
        assert!(matches!(open_ab(&envelope), Err(CryptoError::UnsupportedVersion(7))));
    }

    #[test]
    fn test_bad_base64_is_decode_error() {
        let mut value = serde_json::to_value(seal_ab(b"x")).unwrap();
        value["message"] = serde_json::json!("***not base64***");
        let envelope: Envelope = serde_json::from_value(value).unwrap();
        assert!(matches!(open_ab(&envelope), Err(CryptoError::Decode(_))));
    }
}
