//! Cache Module
//!
//! One async contract over two interchangeable backends: an embedded LMDB
//! store and a pooled Redis connection. Values are encoded client-side so both
//! backends store the same bytes.

mod embedded;
pub mod lmdb;
mod networked;
mod pattern;
mod stats;
mod value;

#[cfg(test)]
mod property_tests;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::config::{CacheBackendKind, Config};
use crate::error::Result;

// Re-export public types
pub use embedded::EmbeddedCache;
pub use networked::RedisCache;
pub use pattern::glob_match;
pub use stats::CacheStats;
pub use value::CacheValue;
pub use lmdb::{GcOutcome, LmdbStore};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Fraction of free pages that triggers an embedded store compaction
pub const DEFAULT_DISCARD_RATIO: f64 = 0.7;

// == Cache Trait ==
/// Operations every cache backend provides.
///
/// `expires_in_secs == 0` stores the value without expiry on every backend.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Checks for a key without decoding its value.
    async fn has(&self, key: &str) -> Result<bool>;

    /// Returns `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    async fn set(&self, key: &str, value: CacheValue, expires_in_secs: u64) -> Result<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every key matching the glob `pattern`.
    async fn empty_by_match(&self, pattern: &str) -> Result<()>;

    /// Deletes every key the backend owns (the whole namespace when prefixed).
    async fn empty(&self) -> Result<()>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

// == Backend Selection ==
/// A concrete backend, kept so startup can wire backend-specific upkeep.
#[derive(Clone)]
pub enum Backend {
    Embedded(EmbeddedCache),
    Redis(RedisCache),
}

impl Backend {
    /// The backend behind the common contract.
    pub fn shared(&self) -> Arc<dyn Cache> {
        match self {
            Backend::Embedded(cache) => Arc::new(cache.clone()),
            Backend::Redis(cache) => Arc::new(cache.clone()),
        }
    }
}

/// Opens the backend selected by `config.cache_backend`.
///
/// Returns `Ok(None)` when caching is disabled.
pub fn open_cache(config: &Config) -> Result<Option<Backend>> {
    let backend = match config.cache_backend {
        CacheBackendKind::Disabled => return Ok(None),
        CacheBackendKind::Embedded => Backend::Embedded(EmbeddedCache::open(
            &config.cache_dir,
            config.cache_map_size_mb.saturating_mul(1024 * 1024),
        )?),
        CacheBackendKind::Redis => Backend::Redis(RedisCache::connect(&config.redis)?),
    };

    info!(backend = backend.shared().backend(), "cache opened");
    Ok(Some(backend))
}

// == Typed Helpers ==
/// Stores any serializable value.
pub async fn set_as<T: Serialize + Sync>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    expires_in_secs: u64,
) -> Result<()> {
    let value = CacheValue::from_serialize(value)?;
    cache.set(key, value, expires_in_secs).await
}

/// Reads a value back into a concrete type.
pub async fn get_as<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Result<Option<T>> {
    match cache.get(key).await? {
        Some(value) => value.into_deserialize().map(Some),
        None => Ok(None),
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(crate::error::CacheError::InvalidRequest(
            "Key cannot be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(crate::error::CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
