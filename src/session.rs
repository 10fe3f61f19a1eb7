//! Session Module
//!
//! Server-side session state keyed by a random id carried in the
//! `_<app>_session` cookie.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use tokio::sync::RwLock;

// == Session Data ==
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Option<i64>,
    /// Hash of the remember-me pairing issued at login
    pub remember_token: Option<String>,
    pub flash: Option<String>,
}

impl SessionData {
    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }
}

// == Session Store ==
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data for `id`, empty when the session is unknown.
    pub async fn load(&self, id: &str) -> SessionData {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn save(&self, id: &str, data: SessionData) {
        self.sessions.write().await.insert(id.to_string(), data);
    }

    /// Stores `data` under a new id.
    pub async fn create(&self, data: SessionData) -> String {
        let id = new_session_id();
        self.save(&id, data).await;
        id
    }

    /// Moves the session to a fresh id, invalidating the old one.
    pub async fn renew(&self, id: &str) -> String {
        let mut sessions = self.sessions.write().await;
        let data = sessions.remove(id).unwrap_or_default();
        let new_id = new_session_id();
        sessions.insert(new_id.clone(), data);
        new_id
    }

    pub async fn destroy(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Removes and returns the flash message.
    pub async fn take_flash(&self, id: &str) -> Option<String> {
        self.sessions.write().await.get_mut(id)?.flash.take()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
