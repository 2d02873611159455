//! # Bridge Crypto
//!
//! Cryptographic primitives for the bus bridge.
//!
//! ## Contents
//!
//! - **keys**: RSA keypair generation and PEM encoding
//! - **envelope**: hybrid RSA/AES envelope sealing and opening (versions 1 and 2)
//! - **challenge**: signed freshness tokens proving possession of a private key
//!
//! Nothing in this crate knows where keys live. Callers resolve keys
//! (see `bridge-shared::codec`) and hand them in explicitly.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bridge_crypto::{envelope, KeyPair};
//!
//! let sender = KeyPair::generate(2048)?;
//! let recipient = KeyPair::generate(2048)?;
//!
//! let sealed = envelope::seal(
//!     b"hello",
//!     "loc-7",
//!     "cloud",
//!     sender.private_key(),
//!     recipient.public_key(),
//! )?;
//! let plain = envelope::open(&sealed, recipient.private_key(), sender.public_key())?;
//! assert_eq!(plain, b"hello");
//! # Ok::<(), bridge_crypto::CryptoError>(())
//! ```

#![warn(missing_docs)]

pub mod challenge;
pub mod envelope;
mod error;
pub mod keys;

pub use challenge::AuthChallenge;
pub use envelope::{Envelope, CURRENT_ENVELOPE_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use keys::{parse_public_key_pem, KeyPair, DEFAULT_KEY_BITS};

/// Re-exported so callers can hold key handles without depending on `rsa` directly.
pub use rsa::{RsaPrivateKey, RsaPublicKey};
