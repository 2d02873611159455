//! RSA keypairs and the SHA-256 / PKCS#1 v1.5 signing primitives shared by
//! envelopes and challenges.

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Modulus size used for newly issued keypairs.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus that still fits a SHA-256 PKCS#1 v1.5 signature and a
/// wrapped 16-byte message key.
const MIN_KEY_BITS: usize = 1024;

/// An RSA keypair owned by exactly one party.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field(
                "modulus_bytes",
                &rsa::traits::PublicKeyParts::size(&self.public),
            )
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh keypair. CPU heavy: async callers should run this on a
    /// blocking thread.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::Key(format!(
                "key size {} is below the minimum of {} bits",
                bits, MIN_KEY_BITS
            )));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::Key(format!("key generation failed: {}", e)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Load a keypair from a PKCS#8 (or legacy PKCS#1) private key PEM.
    pub fn from_private_pem(pem: &str) -> CryptoResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::Key(format!("invalid private key PEM: {}", e)))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Private half.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// PKCS#8 PEM of the private key.
    pub fn private_key_pem(&self) -> CryptoResult<String> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Key(format!("failed to encode private key: {}", e)))?;
        Ok(pem.to_string())
    }

    /// SPKI PEM of the public key.
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        public_key_pem(&self.public)
    }
}

/// SPKI PEM of a public key.
pub fn public_key_pem(key: &RsaPublicKey) -> CryptoResult<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Key(format!("failed to encode public key: {}", e)))
}

/// Parse a public key PEM. SPKI (`BEGIN PUBLIC KEY`) and PKCS#1
/// (`BEGIN RSA PUBLIC KEY`) are both accepted.
pub fn parse_public_key_pem(pem: &str) -> CryptoResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem.trim())
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem.trim()))
        .map_err(|e| CryptoError::Key(format!("invalid public key PEM: {}", e)))
}

/// Sign `data` with SHA-256 / RSASSA-PKCS1-v1_5.
pub fn sign(private: &RsaPrivateKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
    let digest = Sha256::digest(data);
    private
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| CryptoError::Encryption(format!("signing failed: {}", e)))
}

/// Verify a SHA-256 / RSASSA-PKCS1-v1_5 signature over `data`.
pub fn verify(public: &RsaPublicKey, data: &[u8], signature: &[u8]) -> CryptoResult<()> {
    let digest = Sha256::digest(data);
    public
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| CryptoError::Integrity)
}
