//! Bearer Token Module
//!
//! Token generation. The plaintext is handed to the client once; only its
//! SHA-256 hash is ever stored or looked up.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

// == Public Constants ==
/// Random bytes behind every token
pub const TOKEN_BYTES: usize = 16;

/// Length of the base32 plaintext (16 bytes, unpadded)
pub const TOKEN_LENGTH: usize = 26;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

// == Token ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub email: String,
    /// Only populated on a freshly generated token
    pub plain_text: String,
    pub hash: [u8; 32],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Creates an unsaved token for `user_id` that expires after `ttl`.
pub fn generate_token(user_id: i64, ttl: Duration) -> Token {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let plain_text = base32_encode(&bytes);
    let now = Utc::now();

    Token {
        id: 0,
        user_id,
        first_name: String::new(),
        email: String::new(),
        hash: hash_token(&plain_text),
        plain_text,
        created_at: now,
        updated_at: now,
        expires: now + ttl,
    }
}

/// SHA-256 of a plaintext token, the only form that is persisted.
pub fn hash_token(plain_text: &str) -> [u8; 32] {
    Sha256::digest(plain_text.as_bytes()).into()
}

/// RFC 4648 base32 without padding.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }

    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base32_known_vectors() {
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"fo"), "MZXQ");
        assert_eq!(base32_encode(b"foo"), "MZXW6");
        assert_eq!(base32_encode(b"foob"), "MZXW6YQ");
        assert_eq!(base32_encode(b"fooba"), "MZXW6YTB");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token(7, Duration::hours(1));

        assert_eq!(token.plain_text.len(), TOKEN_LENGTH);
        assert!(token
            .plain_text
            .bytes()
            .all(|b| BASE32_ALPHABET.contains(&b)));
        assert_eq!(token.hash, hash_token(&token.plain_text));
        assert_eq!(token.user_id, 7);
        assert!(!token.is_expired());
        assert!(token.is_expired_at(token.expires + Duration::seconds(1)));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token(1, Duration::hours(1));
        let b = generate_token(1, Duration::hours(1));
        assert_ne!(a.plain_text, b.plain_text);
        assert_ne!(a.hash, b.hash);
    }
}
