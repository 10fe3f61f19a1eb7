//! User records and password hashing.
//!
//! Passwords are stored as Argon2id PHC strings.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::Token;
use crate::error::AuthError;

// == User ==
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Token the user authenticated with, when looked up through one
    #[serde(skip)]
    pub token: Option<Token>,
}

impl User {
    /// Builds an unsaved, active user with a freshly hashed password.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Result<Self, AuthError> {
        let now = Utc::now();
        Ok(Self {
            id: 0,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            active: true,
            password_hash: hash_password(password)?,
            created_at: now,
            updated_at: now,
            token: None,
        })
    }

    pub fn set_password(&mut self, password: &str) -> Result<(), AuthError> {
        self.password_hash = hash_password(password)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `Ok(false)` on a mismatch; errors only when the stored hash is unreadable.
    pub fn password_matches(&self, password: &str) -> Result<bool, AuthError> {
        verify_password(password, &self.password_hash)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Password(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Password(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
