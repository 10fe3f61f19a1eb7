//! Shared application state.

use std::sync::Arc;

use chrono::Duration;

use crate::auth::{
    Encryption, RememberMe, RememberTokenStore, TokenService, TokenStore, UrlSigner, UserStore,
};
use crate::cache::{Backend, Cache, EmbeddedCache};
use crate::config::Config;
use crate::error::{AuthError, CacheError};
use crate::mail::Mailer;
use crate::session::SessionStore;

/// Upper bound on bearer token lifetime (ten years)
const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Handles every request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when caching is disabled
    pub cache: Option<Arc<dyn Cache>>,
    /// Set for the embedded backend, used for health stats
    pub embedded: Option<EmbeddedCache>,
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub remember: RememberMe,
    pub sessions: SessionStore,
    pub signer: UrlSigner,
    pub encryption: Encryption,
    pub mailer: Mailer,
}

impl AppState {
    /// Wires one store that serves users, tokens and remember-me pairings.
    pub fn new<S>(
        config: Config,
        backend: Option<Backend>,
        store: Arc<S>,
        mailer: Mailer,
    ) -> Result<Self, AuthError>
    where
        S: UserStore + TokenStore + RememberTokenStore + 'static,
    {
        let encryption = Encryption::new(config.encryption_key.as_bytes())?;
        let ttl = Duration::seconds(config.token_ttl.min(MAX_TOKEN_TTL_SECS) as i64);

        let embedded = match &backend {
            Some(Backend::Embedded(cache)) => Some(cache.clone()),
            _ => None,
        };

        Ok(Self {
            cache: backend.as_ref().map(Backend::shared),
            embedded,
            users: store.clone(),
            tokens: TokenService::new(store.clone(), store.clone(), ttl),
            remember: RememberMe::new(store, &config),
            sessions: SessionStore::new(),
            signer: UrlSigner::new(config.encryption_key.as_bytes()),
            encryption,
            mailer,
            config: Arc::new(config),
        })
    }

    /// The configured cache, or `BackendUnavailable` when caching is off.
    pub fn cache(&self) -> Result<&Arc<dyn Cache>, CacheError> {
        self.cache
            .as_ref()
            .ok_or_else(|| CacheError::BackendUnavailable("caching is disabled".to_string()))
    }
}
