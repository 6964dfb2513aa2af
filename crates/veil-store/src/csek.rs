//! Customer-supplied key sealing used by the in-memory backend.
//!
//! The store keeps only the ciphertext and a SHA-256 fingerprint of the key,
//! the same contract a remote object store offers for customer-supplied
//! keys: the key itself is never retained.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use veil_types::KeySecret;

use crate::error::{StoreError, StoreResult};

pub(crate) const ALGORITHM: &str = "AES256";
const NONCE_LEN: usize = 12;

/// Payload sealed under a customer-supplied key.
#[derive(Clone)]
pub(crate) struct SealedPayload {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    key_sha256: [u8; 32],
}

impl SealedPayload {
    pub(crate) fn seal(key: &KeySecret, plaintext: &[u8]) -> StoreResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StoreError::Internal(format!("cipher init failed: {e}")))?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| StoreError::Internal(format!("seal failed: {e}")))?;
        Ok(Self {
            nonce,
            ciphertext,
            key_sha256: fingerprint(key),
        })
    }

    /// Returns `None` when `key` is not the key this payload was sealed with.
    pub(crate) fn open(&self, key: &KeySecret) -> StoreResult<Option<Vec<u8>>> {
        if fingerprint(key) != self.key_sha256 {
            return Ok(None);
        }
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StoreError::Internal(format!("cipher init failed: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|e| StoreError::Internal(format!("open failed: {e}")))?;
        Ok(Some(plaintext))
    }

    pub(crate) fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub(crate) fn key_sha256_b64(&self) -> String {
        STANDARD.encode(self.key_sha256)
    }
}

fn fingerprint(key: &KeySecret) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}
