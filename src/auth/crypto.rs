//! AES-256-GCM field encryption.
//!
//! Output is base64url of `nonce || ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::RngCore;

use crate::error::AuthError;

const NONCE_SIZE: usize = 12;

pub const KEY_SIZE: usize = 32;

#[derive(Clone)]
pub struct Encryption {
    cipher: Aes256Gcm,
}

impl Encryption {
    /// `key` must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, AuthError> {
        if key.len() != KEY_SIZE {
            return Err(AuthError::Encryption(format!(
                "key must be {} bytes, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AuthError::Encryption(format!("Failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plain_text: &str) -> Result<String, AuthError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plain_text.as_bytes())
            .map_err(|e| AuthError::Encryption(format!("Encryption failed: {e}")))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, AuthError> {
        let sealed = URL_SAFE
            .decode(encoded)
            .map_err(|e| AuthError::Encryption(format!("Invalid base64: {e}")))?;
        if sealed.len() < NONCE_SIZE {
            return Err(AuthError::Encryption("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| AuthError::Encryption(format!("Decryption failed: {e}")))?;

        String::from_utf8(plain)
            .map_err(|e| AuthError::Encryption(format!("Invalid UTF-8 in decrypted value: {e}")))
    }
}
