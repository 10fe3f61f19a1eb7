//! Remember-me cookies.
//!
//! The cookie carries `<user id>|<hash>`; the same hash is stored as the
//! pairing, so a stolen database row alone never yields the random secret.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::auth::store::RememberTokenStore;
use crate::config::Config;
use crate::error::AuthError;

/// Lifetime of a remember-me cookie
pub const REMEMBER_DAYS: i64 = 14;

const SECRET_LENGTH: usize = 12;

// == Remember Me ==
#[derive(Clone)]
pub struct RememberMe {
    store: Arc<dyn RememberTokenStore>,
    cookie_name: String,
    secure: bool,
    domain: Option<String>,
}

impl RememberMe {
    pub fn new(store: Arc<dyn RememberTokenStore>, config: &Config) -> Self {
        Self {
            store,
            cookie_name: config.remember_cookie_name(),
            secure: config.cookie_secure,
            domain: config.cookie_domain.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Persists a new pairing for `user_id` and returns its hash with the cookie to set.
    pub async fn issue(&self, user_id: i64) -> Result<(String, Cookie<'static>), AuthError> {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LENGTH)
            .map(char::from)
            .collect();
        let hash = URL_SAFE.encode(Sha256::digest(secret.as_bytes()));

        self.store.insert(user_id, &hash).await?;
        debug!(user_id, "remember-me pairing stored");

        let value = format!("{}|{}", user_id, hash);
        let max_age = Duration::days(REMEMBER_DAYS);
        let cookie = self.cookie(value, max_age, OffsetDateTime::now_utc() + max_age);
        Ok((hash, cookie))
    }

    /// Splits a cookie value into user id and hash.
    pub fn parse_cookie(value: &str) -> Option<(i64, String)> {
        let (id, hash) = value.split_once('|')?;
        if hash.is_empty() {
            return None;
        }
        Some((id.parse().ok()?, hash.to_string()))
    }

    /// Resolves a cookie value to a stored pairing.
    ///
    /// `Ok(None)` means the cookie is unusable and should be expired.
    pub async fn check(&self, value: &str) -> Result<Option<(i64, String)>, AuthError> {
        let Some((user_id, hash)) = Self::parse_cookie(value) else {
            return Ok(None);
        };

        if self.store.exists(user_id, &hash).await? {
            Ok(Some((user_id, hash)))
        } else {
            Ok(None)
        }
    }

    pub async fn forget(&self, hash: &str) -> Result<(), AuthError> {
        self.store.delete(hash).await
    }

    /// Same cookie, emptied and already expired.
    pub fn expire_cookie(&self) -> Cookie<'static> {
        self.cookie(
            String::new(),
            Duration::ZERO,
            OffsetDateTime::now_utc() - Duration::hours(100),
        )
    }

    fn cookie(&self, value: String, max_age: Duration, expires: OffsetDateTime) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure)
            .max_age(max_age)
            .expires(expires)
            .build();

        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;

    fn remember() -> RememberMe {
        let config = Config {
            cookie_domain: Some("example.com".to_string()),
            ..Config::default()
        };
        RememberMe::new(Arc::new(MemoryStore::new()), &config)
    }

    #[tokio::test]
    async fn test_issue_and_check() {
        let remember = remember();
        let (hash, cookie) = remember.issue(5).await.unwrap();

        assert_eq!(cookie.name(), "_webcore_remember");
        assert_eq!(cookie.value(), format!("5|{}", hash));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.max_age(), Some(Duration::days(14)));
        // base64 of a 32 byte digest
        assert_eq!(hash.len(), 44);

        let checked = remember.check(cookie.value()).await.unwrap();
        assert_eq!(checked, Some((5, hash.clone())));

        remember.forget(&hash).await.unwrap();
        assert_eq!(remember.check(cookie.value()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_rejects_foreign_pairs() {
        let remember = remember();
        let (hash, _) = remember.issue(5).await.unwrap();

        assert_eq!(remember.check(&format!("6|{}", hash)).await.unwrap(), None);
        assert_eq!(remember.check("garbage").await.unwrap(), None);
    }

    #[test]
    fn test_parse_cookie() {
        assert_eq!(
            RememberMe::parse_cookie("12|abc=="),
            Some((12, "abc==".to_string()))
        );
        assert_eq!(RememberMe::parse_cookie("x|abc"), None);
        assert_eq!(RememberMe::parse_cookie("12|"), None);
        assert_eq!(RememberMe::parse_cookie("12"), None);
    }

    #[test]
    fn test_expire_cookie() {
        let cookie = remember().expire_cookie();
        assert_eq!(cookie.name(), "_webcore_remember");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.http_only(), Some(true));
    }
}
