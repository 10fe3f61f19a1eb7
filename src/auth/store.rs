//! Credential Storage Module
//!
//! Repository traits for users, bearer tokens and remember-me pairings, plus
//! an in-memory implementation. A SQL-backed store implements the same traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::auth::{Token, User};
use crate::error::AuthError;

type Result<T> = std::result::Result<T, AuthError>;

// == Row Id ==
/// Identifier handed back by a storage driver after an insert.
///
/// Drivers report either width; callers normalise with [`RowId::as_i64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowId {
    Int32(i32),
    Int64(i64),
}

impl RowId {
    pub fn as_i64(self) -> i64 {
        match self {
            RowId::Int32(id) => i64::from(id),
            RowId::Int64(id) => id,
        }
    }
}

impl From<i32> for RowId {
    fn from(id: i32) -> Self {
        RowId::Int32(id)
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId::Int64(id)
    }
}

// == Remember Token ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberToken {
    pub id: i64,
    pub user_id: i64,
    /// base64url SHA-256 of the random cookie secret
    pub remember_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// == Repository Traits ==
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persists a new user; the id on `user` is ignored.
    async fn insert(&self, user: User) -> Result<RowId>;

    async fn update(&self, user: &User) -> Result<()>;

    /// Removes the user together with their tokens.
    async fn delete(&self, id: i64) -> Result<()>;

    async fn all(&self) -> Result<Vec<User>>;

    async fn reset_password(&self, id: i64, password: &str) -> Result<()> {
        let mut user = self.get(id).await?.ok_or(AuthError::UserNotFound)?;
        user.set_password(password)?;
        self.update(&user).await
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Token>>;

    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Option<Token>>;

    /// Every token of `user_id`, newest first.
    async fn for_user(&self, user_id: i64) -> Result<Vec<Token>>;

    /// Deletes all tokens of `token.user_id` and stores `token`, atomically.
    async fn replace_for_user(&self, token: Token) -> Result<RowId>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn delete_by_hash(&self, hash: &[u8; 32]) -> Result<()>;
}

#[async_trait]
pub trait RememberTokenStore: Send + Sync {
    async fn insert(&self, user_id: i64, hash: &str) -> Result<RowId>;

    async fn exists(&self, user_id: i64, hash: &str) -> Result<bool>;

    async fn delete(&self, hash: &str) -> Result<()>;
}

// == Memory Store ==
#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: BTreeMap<i64, Token>,
    remember: BTreeMap<i64, RememberToken>,
    next_user_id: i64,
    next_token_id: i64,
    next_remember_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// All three repositories over in-process maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, mut user: User) -> Result<RowId> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(AuthError::Storage(format!(
                "user with email {} already exists",
                user.email
            )));
        }

        let id = next_id(&mut tables.next_user_id);
        let now = Utc::now();
        user.id = id;
        user.created_at = now;
        user.updated_at = now;
        user.token = None;
        tables.users.insert(id, user);
        Ok(RowId::Int64(id))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or(AuthError::UserNotFound)?;

        *stored = User {
            token: None,
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&id);
        tables.tokens.retain(|_, t| t.user_id != id);
        tables.remember.retain(|_, r| r.user_id != id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.last_name.cmp(&b.last_name));
        Ok(users)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<Token>> {
        Ok(self.tables.read().await.tokens.get(&id).cloned())
    }

    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Option<Token>> {
        let tables = self.tables.read().await;
        Ok(tables.tokens.values().find(|t| &t.hash == hash).cloned())
    }

    async fn for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        let tables = self.tables.read().await;
        let mut tokens: Vec<Token> = tables
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tokens)
    }

    async fn replace_for_user(&self, mut token: Token) -> Result<RowId> {
        let mut tables = self.tables.write().await;
        tables.tokens.retain(|_, t| t.user_id != token.user_id);

        let id = next_id(&mut tables.next_token_id);
        token.id = id;
        token.plain_text.clear();
        tables.tokens.insert(id, token);
        Ok(RowId::Int64(id))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.tables.write().await.tokens.remove(&id);
        Ok(())
    }

    async fn delete_by_hash(&self, hash: &[u8; 32]) -> Result<()> {
        self.tables
            .write()
            .await
            .tokens
            .retain(|_, t| &t.hash != hash);
        Ok(())
    }
}

#[async_trait]
impl RememberTokenStore for MemoryStore {
    async fn insert(&self, user_id: i64, hash: &str) -> Result<RowId> {
        let mut tables = self.tables.write().await;
        let id = next_id(&mut tables.next_remember_id);
        let now = Utc::now();
        tables.remember.insert(
            id,
            RememberToken {
                id,
                user_id,
                remember_token: hash.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(RowId::Int64(id))
    }

    async fn exists(&self, user_id: i64, hash: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .remember
            .values()
            .any(|r| r.user_id == user_id && r.remember_token == hash))
    }

    async fn delete(&self, hash: &str) -> Result<()> {
        self.tables
            .write()
            .await
            .remember
            .retain(|_, r| r.remember_token != hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_token;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new("Jack", "Smith", email, "password").unwrap()
    }

    #[test]
    fn test_row_id_widths() {
        assert_eq!(RowId::from(7i32).as_i64(), 7);
        assert_eq!(RowId::from(i64::MAX).as_i64(), i64::MAX);
    }

    #[tokio::test]
    async fn test_user_insert_and_lookup() {
        let store = MemoryStore::new();
        let id = UserStore::insert(&store, user("a@example.com"))
            .await
            .unwrap()
            .as_i64();

        let by_email = store.get_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert!(UserStore::insert(&store, user("a@example.com")).await.is_err());
        assert!(store.get_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_password() {
        let store = MemoryStore::new();
        let id = UserStore::insert(&store, user("a@example.com"))
            .await
            .unwrap()
            .as_i64();

        store.reset_password(id, "changed").await.unwrap();
        let reloaded = UserStore::get(&store, id).await.unwrap().unwrap();
        assert!(reloaded.password_matches("changed").unwrap());

        assert_eq!(
            store.reset_password(999, "x").await,
            Err(AuthError::UserNotFound)
        );
    }

    #[tokio::test]
    async fn test_replace_keeps_one_token_per_user() {
        let store = MemoryStore::new();
        let first = generate_token(1, Duration::hours(1));
        let second = generate_token(1, Duration::hours(1));
        let other = generate_token(2, Duration::hours(1));

        store.replace_for_user(first.clone()).await.unwrap();
        store.replace_for_user(other).await.unwrap();
        let id = store.replace_for_user(second.clone()).await.unwrap();

        let tokens = store.for_user(1).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].id, id.as_i64());
        assert!(tokens[0].plain_text.is_empty());
        assert!(store.get_by_hash(&first.hash).await.unwrap().is_none());
        assert!(store.get_by_hash(&second.hash).await.unwrap().is_some());
        assert_eq!(store.for_user(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_user_removes_credentials() {
        let store = MemoryStore::new();
        let id = UserStore::insert(&store, user("a@example.com"))
            .await
            .unwrap()
            .as_i64();
        store
            .replace_for_user(generate_token(id, Duration::hours(1)))
            .await
            .unwrap();
        RememberTokenStore::insert(&store, id, "hash").await.unwrap();

        UserStore::delete(&store, id).await.unwrap();
        assert!(store.for_user(id).await.unwrap().is_empty());
        assert!(!store.exists(id, "hash").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_pairings() {
        let store = MemoryStore::new();
        RememberTokenStore::insert(&store, 1, "abc").await.unwrap();

        assert!(store.exists(1, "abc").await.unwrap());
        assert!(!store.exists(2, "abc").await.unwrap());

        RememberTokenStore::delete(&store, "abc").await.unwrap();
        assert!(!store.exists(1, "abc").await.unwrap());
    }
}
