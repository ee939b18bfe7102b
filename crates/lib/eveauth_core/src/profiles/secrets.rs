//! AES-256-GCM sealing for provider refresh tokens at rest.
//!
//! Sealed values are base64 of `nonce || ciphertext || tag` with a random
//! 12-byte nonce, suitable for TEXT columns.

use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::auth::jwt::{data_path, load_or_create_secret};
use crate::sso::SsoError;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Seals and opens stored refresh tokens with a key derived from a passphrase.
#[derive(Clone)]
pub struct TokenSealer {
    cipher: Aes256Gcm,
}

impl TokenSealer {
    /// Derive the 32-byte key as SHA-256 of the passphrase.
    pub fn new(passphrase: &str) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, SsoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| SsoError::Storage(format!("seal failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    pub fn open(&self, sealed: &str) -> Result<String, SsoError> {
        let combined = STANDARD
            .decode(sealed)
            .map_err(|e| SsoError::Storage(format!("sealed value is not base64: {e}")))?;
        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SsoError::Storage("sealed value too short".into()));
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SsoError::Storage(format!("open failed: {e}")))?;
        String::from_utf8(plaintext).map_err(|e| SsoError::Storage(format!("utf-8: {e}")))
    }
}

/// Resolve the refresh-token sealing passphrase: env var
/// `TOKEN_ENCRYPTION_KEY` → persisted file.
///
/// A generated key that cannot be persisted is an error.
pub fn resolve_token_encryption_key() -> Result<String, SsoError> {
    token_key_from(
        std::env::var("TOKEN_ENCRYPTION_KEY").ok(),
        &data_path("token-encryption-key"),
    )
}

fn token_key_from(configured: Option<String>, path: &Path) -> Result<String, SsoError> {
    if let Some(key) = configured.filter(|k| !k.is_empty()) {
        return Ok(key);
    }
    load_or_create_secret(path).map_err(|e| {
        SsoError::Storage(format!(
            "cannot persist token encryption key at {}: {e}",
            path.display()
        ))
    })
}
