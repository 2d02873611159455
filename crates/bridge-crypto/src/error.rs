use thiserror::Error;

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised while handling keys, envelopes and challenges.
///
/// `Integrity` is deliberately its own variant: a signature mismatch must
/// never be confused with a malformed message.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be generated, parsed or encoded.
    #[error("key error: {0}")]
    Key(String),

    /// The signature does not match the signed bytes.
    #[error("signature verification failed")]
    Integrity,

    /// Base64, padding or length problems in an encoded field.
    #[error("decode error: {0}")]
    Decode(String),

    /// The RSA or AES primitive itself failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The envelope declares a version this build cannot read.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
}

impl CryptoError {
    /// True for signature failures, which callers treat as hard integrity errors.
    pub fn is_integrity(&self) -> bool {
        matches!(self, CryptoError::Integrity)
    }
}
