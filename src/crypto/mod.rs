//! AES-256-GCM encryption of tenant database passwords.
//!
//! Stored format is `base64(nonce || ciphertext || tag)` using the standard
//! alphabet. The key is derived once per process from the configured secret.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors from CredentialCipher. Messages never carry key or plaintext material.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Encryption key is empty")]
    EmptyKey,

    #[error("Ciphertext is not valid base64")]
    Encoding,

    #[error("Ciphertext too short")]
    TooShort,

    #[error("Ciphertext failed authentication")]
    Authentication,

    #[error("Decrypted value is not valid UTF-8")]
    Utf8,
}

/// Process-wide cipher for credentials at rest
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build a cipher from a configured secret of any length.
    /// The AES key is SHA-256(secret).
    pub fn new(secret: &str) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::EmptyKey);
        }
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt raw bytes with a fresh random nonce.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm only fails here for inputs beyond the GCM length limit
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::Authentication)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Decrypt to raw bytes. Fails closed on any malformed or tampered input.
    pub fn decrypt_bytes(&self, encoded: &str) -> Result<Vec<u8>, CipherError> {
        let combined = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CipherError::Encoding)?;

        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::TooShort);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::Authentication)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.encrypt_bytes(plaintext.as_bytes())
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let bytes = self.decrypt_bytes(encoded)?;
        String::from_utf8(bytes).map_err(|_| CipherError::Utf8)
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}
