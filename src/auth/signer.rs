//! Signed, time-limited URLs.
//!
//! `<url>{?|&}signed_at=<unix secs>&signature=<hex hmac-sha256>`, where the
//! signature covers everything before `&signature=`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PARAM: &str = "&signature=";

/// Lifetime of a password reset link
pub const RESET_LINK_MINUTES: i64 = 60;

// == Url Signer ==
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn sign(&self, url: &str) -> Result<String, AuthError> {
        self.sign_at(url, Utc::now())
    }

    /// Signs `url` as if issued at `signed_at`.
    pub fn sign_at(&self, url: &str, signed_at: DateTime<Utc>) -> Result<String, AuthError> {
        let separator = if url.contains('?') { '&' } else { '?' };
        let unsigned = format!("{}{}signed_at={}", url, separator, signed_at.timestamp());

        let mut mac = self.mac()?;
        mac.update(unsigned.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}{}{}", unsigned, SIGNATURE_PARAM, signature))
    }

    /// True when the signature matches the rest of the URL.
    pub fn verify(&self, url: &str) -> bool {
        let Some(idx) = url.rfind(SIGNATURE_PARAM) else {
            return false;
        };
        let (unsigned, signature) = (&url[..idx], &url[idx + SIGNATURE_PARAM.len()..]);

        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(unsigned.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    /// True when `signed_at` is missing, unreadable or older than `window` at `now`.
    pub fn expired(&self, url: &str, window: Duration, now: DateTime<Utc>) -> bool {
        match signed_at(url) {
            Some(at) => now - at > window,
            None => true,
        }
    }

    /// Signature first, then age.
    pub fn check(&self, url: &str, window: Duration, now: DateTime<Utc>) -> Result<(), AuthError> {
        if !self.verify(url) {
            return Err(AuthError::SignatureInvalid);
        }
        if self.expired(url, window, now) {
            return Err(AuthError::LinkExpired);
        }
        Ok(())
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Encryption(format!("invalid signing key: {}", e)))
    }
}

fn signed_at(url: &str) -> Option<DateTime<Utc>> {
    let parsed = url::Url::parse(url).ok()?;
    let secs = parsed
        .query_pairs()
        .find(|(name, _)| name == "signed_at")?
        .1
        .parse::<i64>()
        .ok()?;
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "http://localhost:3000/users/reset-password?email=jack%40example.com";

    fn signer() -> UrlSigner {
        UrlSigner::new("change-me-change-me-change-me-32")
    }

    #[test]
    fn test_sign_appends_query() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let signed = signer().sign_at(LINK, at).unwrap();
        assert!(signed.starts_with(&format!("{}&signed_at=1700000000&signature=", LINK)));

        let bare = signer().sign_at("http://localhost/x", at).unwrap();
        assert!(bare.starts_with("http://localhost/x?signed_at=1700000000&signature="));
        assert!(signer().verify(&bare));
    }

    #[test]
    fn test_window() {
        let issued = Utc::now();
        let signed = signer().sign_at(LINK, issued).unwrap();
        let window = Duration::minutes(RESET_LINK_MINUTES);

        assert_eq!(signer().check(&signed, window, issued + Duration::minutes(59)), Ok(()));
        assert_eq!(
            signer().check(&signed, window, issued + Duration::minutes(61)),
            Err(AuthError::LinkExpired)
        );
    }

    #[test]
    fn test_tampering_fails() {
        let signed = signer().sign(LINK).unwrap();
        let window = Duration::minutes(RESET_LINK_MINUTES);

        let tampered = signed.replace("jack%40example.com", "eve%40example.com");
        assert_eq!(
            signer().check(&tampered, window, Utc::now()),
            Err(AuthError::SignatureInvalid)
        );

        for i in signed.len() - 64..signed.len() {
            let mut bytes = signed.clone().into_bytes();
            bytes[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
            let flipped = String::from_utf8(bytes).unwrap();
            assert!(!signer().verify(&flipped), "flipped signature char {}", i);
        }

        let other_key = UrlSigner::new("another-key-another-key-another-");
        assert!(!other_key.verify(&signed));
        assert!(!signer().verify(LINK));
        assert!(!signer().verify(&format!("{}&signature=zz", LINK)));
    }
}
