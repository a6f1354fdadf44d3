//! Encryption of unit prices.
//!
//! Prices delivered through configuration are AES-256-GCM sealed so that
//! operators cannot read or tamper with them. The wire form is
//! `base64(nonce || ciphertext || tag)` over the decimal string of the price.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Length of the AES-GCM nonce prefix in bytes.
const NONCE_LEN: usize = 12;

/// Errors produced while sealing or opening a price.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The ciphertext is not valid base64.
    #[error("invalid base64 ciphertext: {0}")]
    Encoding(String),

    /// The ciphertext is shorter than the nonce.
    #[error("ciphertext too short")]
    TooShort,

    /// Authentication or decryption failed.
    #[error("decryption failed")]
    Decrypt,

    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// The decrypted plaintext is not a decimal integer.
    #[error("decrypted value is not an integer: {0}")]
    NotAnInteger(String),
}

/// Seals and opens integer prices with a shared key.
#[derive(Clone)]
pub struct PriceCipher {
    cipher: Aes256Gcm,
}

impl PriceCipher {
    /// Create a cipher from arbitrary key material.
    ///
    /// The AES-256 key is the SHA-256 digest of `key`.
    ///
    /// # Panics
    ///
    /// Never in practice: a SHA-256 digest is always a valid AES-256 key length.
    #[must_use]
    pub fn new(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        // INVARIANT: SHA-256 yields 32 bytes, the exact AES-256 key size.
        let cipher = Aes256Gcm::new_from_slice(&digest).expect("32-byte key for AES-256");
        Self { cipher }
    }

    /// Encrypt an integer price.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encrypt` if sealing fails.
    pub fn encrypt_int64(&self, value: i64) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, value.to_string().as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt an integer price.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64, fails authentication,
    /// or does not decode to a decimal `i64`.
    pub fn decrypt_int64(&self, encoded: &str) -> Result<i64, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::TooShort);
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Decrypt)?;

        let text = String::from_utf8_lossy(&plain);
        text.trim()
            .parse()
            .map_err(|_| CryptoError::NotAnInteger(text.into_owned()))
    }
}

impl fmt::Debug for PriceCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PriceCipher(..)")
    }
}
