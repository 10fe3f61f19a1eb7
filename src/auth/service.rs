//! Token Service Module
//!
//! Issues bearer tokens and resolves `Authorization` headers to users.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Utc};
use tracing::debug;

use crate::auth::store::{RowId, TokenStore, UserStore};
use crate::auth::token::{generate_token, hash_token, Token, TOKEN_LENGTH};
use crate::auth::User;
use crate::error::AuthError;

type Result<T> = std::result::Result<T, AuthError>;

// == Token Service ==
#[derive(Clone)]
pub struct TokenService {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(tokens: Arc<dyn TokenStore>, users: Arc<dyn UserStore>, ttl: Duration) -> Self {
        Self { tokens, users, ttl }
    }

    /// A fresh, unsaved token for `user_id` using the configured lifetime.
    pub fn generate(&self, user_id: i64) -> Token {
        generate_token(user_id, self.ttl)
    }

    /// Stores `token` for `user`, revoking every token the user held before.
    pub async fn insert(&self, token: &Token, user: &User) -> Result<RowId> {
        let now = Utc::now();
        let stored = Token {
            user_id: user.id,
            first_name: user.first_name.clone(),
            email: user.email.clone(),
            plain_text: String::new(),
            created_at: now,
            updated_at: now,
            ..token.clone()
        };

        let id = self.tokens.replace_for_user(stored).await?;
        debug!(user_id = user.id, token_id = id.as_i64(), "token issued");
        Ok(id)
    }

    /// Resolves an `Authorization: Bearer <token>` header to its user.
    ///
    /// Expiry is checked before the user lookup, so an expired token for a
    /// deleted user still reports `TokenExpired`.
    pub async fn authenticate_token(&self, headers: &HeaderMap) -> Result<User> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingOrMalformedCredential)?;

        let parts: Vec<&str> = header.split(' ').collect();
        if parts.len() != 2 || parts[0] != "Bearer" {
            return Err(AuthError::MissingOrMalformedCredential);
        }

        let plain_text = parts[1];
        if plain_text.len() != TOKEN_LENGTH {
            return Err(AuthError::InvalidTokenFormat);
        }

        let token = self.get_by_token(plain_text).await?;
        if token.is_expired() {
            return Err(AuthError::TokenExpired);
        }

        let mut user = self
            .users
            .get(token.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        user.token = Some(token);
        Ok(user)
    }

    /// `Ok(true)` for a stored, unexpired token whose user still exists.
    pub async fn valid_token(&self, plain_text: &str) -> Result<bool> {
        let user = self.get_user_for_token(plain_text).await?;
        match user.token {
            Some(token) if token.is_expired() => Err(AuthError::TokenExpired),
            _ => Ok(true),
        }
    }

    /// Owner of a token, with the token attached. Expiry is not checked.
    pub async fn get_user_for_token(&self, plain_text: &str) -> Result<User> {
        let token = self.get_by_token(plain_text).await?;
        let mut user = self
            .users
            .get(token.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        user.token = Some(token);
        Ok(user)
    }

    pub async fn get_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        self.tokens.for_user(user_id).await
    }

    pub async fn get(&self, id: i64) -> Result<Token> {
        self.tokens.get(id).await?.ok_or(AuthError::TokenNotFound)
    }

    pub async fn get_by_token(&self, plain_text: &str) -> Result<Token> {
        self.tokens
            .get_by_hash(&hash_token(plain_text))
            .await?
            .ok_or(AuthError::TokenNotFound)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.tokens.delete(id).await
    }

    pub async fn delete_by_token(&self, plain_text: &str) -> Result<()> {
        self.tokens.delete_by_hash(&hash_token(plain_text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;
    use axum::http::HeaderValue;

    async fn setup() -> (Arc<MemoryStore>, TokenService, User) {
        let store = Arc::new(MemoryStore::new());
        let service = TokenService::new(store.clone(), store.clone(), Duration::hours(1));

        let user = User::new("Jack", "Smith", "jack@example.com", "password").unwrap();
        let id = UserStore::insert(store.as_ref(), user).await.unwrap();
        let user = UserStore::get(store.as_ref(), id.as_i64())
            .await
            .unwrap()
            .unwrap();
        (store, service, user)
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_insert_then_authenticate() {
        let (_store, service, user) = setup().await;
        let token = service.generate(user.id);
        service.insert(&token, &user).await.unwrap();

        let found = service
            .authenticate_token(&bearer(&format!("Bearer {}", token.plain_text)))
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        let attached = found.token.unwrap();
        assert_eq!(attached.email, "jack@example.com");
        assert_eq!(attached.first_name, "Jack");
        assert!(attached.plain_text.is_empty());
    }

    #[tokio::test]
    async fn test_second_insert_revokes_first() {
        let (_store, service, user) = setup().await;
        let first = service.generate(user.id);
        let second = service.generate(user.id);
        service.insert(&first, &user).await.unwrap();
        service.insert(&second, &user).await.unwrap();

        assert_eq!(service.get_tokens_for_user(user.id).await.unwrap().len(), 1);
        assert_eq!(
            service.valid_token(&first.plain_text).await,
            Err(AuthError::TokenNotFound)
        );
        assert_eq!(service.valid_token(&second.plain_text).await, Ok(true));
    }

    #[tokio::test]
    async fn test_malformed_headers() {
        let (_store, service, _user) = setup().await;

        let missing = service.authenticate_token(&HeaderMap::new()).await;
        assert_eq!(missing.unwrap_err(), AuthError::MissingOrMalformedCredential);

        for value in ["Token abc", "Bearer", "Bearer a b"] {
            let result = service.authenticate_token(&bearer(value)).await;
            assert_eq!(result.unwrap_err(), AuthError::MissingOrMalformedCredential);
        }

        let short = service.authenticate_token(&bearer("Bearer ABC")).await;
        assert_eq!(short.unwrap_err(), AuthError::InvalidTokenFormat);

        let unknown = service
            .authenticate_token(&bearer(&format!("Bearer {}", "A".repeat(26))))
            .await;
        assert_eq!(unknown.unwrap_err(), AuthError::TokenNotFound);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (_store, service, user) = setup().await;
        let token = generate_token(user.id, Duration::seconds(-1));
        service.insert(&token, &user).await.unwrap();

        let result = service
            .authenticate_token(&bearer(&format!("Bearer {}", token.plain_text)))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::TokenExpired);
        assert_eq!(
            service.valid_token(&token.plain_text).await,
            Err(AuthError::TokenExpired)
        );
    }

    #[tokio::test]
    async fn test_token_for_deleted_user() {
        let (store, service, user) = setup().await;
        let token = service.generate(user.id);
        service.insert(&token, &user).await.unwrap();

        // Leave the token behind by dropping only the user row.
        let orphan = Token {
            plain_text: String::new(),
            ..token.clone()
        };
        UserStore::delete(store.as_ref(), user.id).await.unwrap();
        store.replace_for_user(orphan).await.unwrap();

        assert_eq!(
            service.valid_token(&token.plain_text).await,
            Err(AuthError::UserNotFound)
        );
    }

    #[tokio::test]
    async fn test_delete_by_token_and_id() {
        let (_store, service, user) = setup().await;
        let token = service.generate(user.id);
        let id = service.insert(&token, &user).await.unwrap().as_i64();

        assert_eq!(service.get(id).await.unwrap().user_id, user.id);
        service.delete_by_token(&token.plain_text).await.unwrap();
        assert_eq!(service.get(id).await, Err(AuthError::TokenNotFound));

        let again = service.generate(user.id);
        let id = service.insert(&again, &user).await.unwrap().as_i64();
        service.delete(id).await.unwrap();
        assert_eq!(
            service.get_by_token(&again.plain_text).await,
            Err(AuthError::TokenNotFound)
        );
    }
}
