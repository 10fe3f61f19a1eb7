//! Embedded Cache Module
//!
//! `Cache` implementation over the LMDB store. Transactions run on the
//! blocking thread pool so request tasks never stall the runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{validate_key, Cache, CacheStats, CacheValue, LmdbStore};
use crate::error::{CacheError, Result};

// == Embedded Cache ==
#[derive(Clone)]
pub struct EmbeddedCache {
    store: Arc<LmdbStore>,
}

impl EmbeddedCache {
    /// Opens the store in `dir`, creating the directory when missing.
    ///
    /// `map_size` is the most bytes the data file may grow to.
    pub fn open(dir: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        Ok(Self::new(Arc::new(LmdbStore::open_with_map_size(dir, map_size)?)))
    }

    pub fn new(store: Arc<LmdbStore>) -> Self {
        Self { store }
    }

    /// Shared handle to the underlying store, used to schedule garbage collection.
    pub fn store(&self) -> Arc<LmdbStore> {
        Arc::clone(&self.store)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.blocking(|store| store.stats()).await
    }

    /// Flushes the store to disk. The handle stays usable afterwards.
    pub async fn close(&self) -> Result<()> {
        self.blocking(|store| store.sync()).await
    }

    async fn blocking<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&LmdbStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| CacheError::Internal(format!("lmdb task failed: {}", e)))?
    }
}

#[async_trait]
impl Cache for EmbeddedCache {
    async fn has(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |store| store.has(&key)).await
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let owned = key.to_string();
        let bytes = self.blocking(move |store| store.get(&owned)).await?;
        bytes.map(|b| CacheValue::decode(&b)).transpose()
    }

    async fn set(&self, key: &str, value: CacheValue, expires_in_secs: u64) -> Result<()> {
        validate_key(key)?;
        let bytes = value.encode()?;
        let ttl = (expires_in_secs > 0).then(|| Duration::from_secs(expires_in_secs));
        let key = key.to_string();
        self.blocking(move |store| store.set(&key, bytes, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |store| store.delete(&key).map(|_| ())).await
    }

    async fn empty_by_match(&self, pattern: &str) -> Result<()> {
        let pattern = pattern.to_string();
        let removed = self
            .blocking(move |store| store.delete_matching(&pattern))
            .await?;
        tracing::debug!(removed, "embedded cache emptied by match");
        Ok(())
    }

    async fn empty(&self) -> Result<()> {
        let removed = self.blocking(|store| store.clear()).await?;
        tracing::debug!(removed, "embedded cache emptied");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "embedded"
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn open_temp() -> (tempfile::TempDir, EmbeddedCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddedCache::open(dir.path().join("cache"), 64 * 1024 * 1024).unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn test_nested_value_round_trip() {
        let (_dir, cache) = open_temp();

        let mut fields = BTreeMap::new();
        fields.insert(
            "hobbies".to_string(),
            CacheValue::Seq(vec!["hiking".into(), "biking".into()]),
        );
        fields.insert("id".to_string(), CacheValue::Int(1));
        let value = CacheValue::Map(fields);

        cache.set("person", value.clone(), 0).await.unwrap();
        assert!(cache.has("person").await.unwrap());
        assert_eq!(cache.get("person").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let (_dir, cache) = open_temp();
        assert_eq!(cache.get("nothing").await.unwrap(), None);
        assert!(!cache.has("nothing").await.unwrap());
        cache.delete("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_expiry_in_seconds() {
        let (_dir, cache) = open_temp();

        cache.set("short", "v".into(), 1).await.unwrap();
        cache.set("forever", "v".into(), 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.has("forever").await.unwrap());
    }

    #[tokio::test]
    async fn test_far_future_expiry_is_kept() {
        let (_dir, cache) = open_temp();

        cache.set("far", "v".into(), u64::MAX).await.unwrap();
        cache.set("farther", "v".into(), 10_000_000_000_000_000).await.unwrap();

        assert_eq!(cache.get("far").await.unwrap(), Some("v".into()));
        assert_eq!(cache.get("farther").await.unwrap(), Some("v".into()));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_serialization_error() {
        let (_dir, cache) = open_temp();

        let store = cache.store();
        store.set("foreign", b"\xc1\xc1 not ours".to_vec(), None).unwrap();

        let result = cache.get("foreign").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_empty_by_match_and_empty() {
        let (_dir, cache) = open_temp();

        for key in ["page:home", "page:about", "user:1"] {
            cache.set(key, "v".into(), 0).await.unwrap();
        }

        cache.empty_by_match("page*").await.unwrap();
        assert!(!cache.has("page:home").await.unwrap());
        assert!(!cache.has("page:about").await.unwrap());
        assert!(cache.has("user:1").await.unwrap());

        cache.empty().await.unwrap();
        assert!(!cache.has("user:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_empty_key() {
        let (_dir, cache) = open_temp();
        let result = cache.set("", "v".into(), 0).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }
}
