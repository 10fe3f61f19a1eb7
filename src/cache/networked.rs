//! Redis Cache Module
//!
//! `Cache` implementation over a pooled Redis connection. Keys are namespaced
//! with `<prefix>:` so several applications can share one server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{validate_key, Cache, CacheValue};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};

/// Keys fetched per `SCAN` round trip
const SCAN_BATCH: usize = 500;

// == Redis Cache ==
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    prefix: String,
}

impl RedisCache {
    // == Constructor ==
    /// Builds the bounded pool described by `config`.
    ///
    /// No connection is opened here; the first borrow dials the server.
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.wait_timeout_ms);
        let mut pool_config = PoolConfig::new(config.max_active.max(1));
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = deadpool_redis::Config::from_url(config.url());
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::BackendUnavailable(e.to_string()))?;

        info!(
            host = %config.host,
            prefix = %config.prefix,
            max_active = config.max_active,
            "redis cache pool created"
        );

        Ok(Self::new(pool, config.prefix.clone()))
    }

    pub fn new(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    /// Starts a task that trims idle connections every `idle_timeout / 2`.
    ///
    /// Connections unused for longer than `idle_timeout` are dropped, and at
    /// most `max_idle` idle connections are kept.
    pub fn spawn_idle_reaper(&self, max_idle: usize, idle_timeout: Duration) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let period = (idle_timeout / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let kept = AtomicUsize::new(0);
                let removed = AtomicUsize::new(0);
                let _ = pool.retain(|_, metrics| {
                    let keep = metrics.last_used() < idle_timeout
                        && kept.fetch_add(1, Ordering::Relaxed) < max_idle;
                    if !keep {
                        removed.fetch_add(1, Ordering::Relaxed);
                    }
                    keep
                });
                let removed = removed.into_inner();
                if removed > 0 {
                    debug!(removed, "reaped idle redis connections");
                }
            }
        })
    }

    /// Namespaced form of `key`.
    pub fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    /// Borrows a connection and checks it is alive with `PING`.
    async fn conn(&self) -> Result<Connection> {
        let mut conn = self.pool.get().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(conn)
    }

    /// Full keys matching the namespaced pattern, gathered with `SCAN`.
    async fn scan_keys(&self, conn: &mut Connection, pattern: &str) -> Result<Vec<String>> {
        let pattern = self.full_key(pattern);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn has(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(self.full_key(key)).await?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let mut conn = self.conn().await?;
        let bytes: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        bytes.map(|b| CacheValue::decode(&b)).transpose()
    }

    async fn set(&self, key: &str, value: CacheValue, expires_in_secs: u64) -> Result<()> {
        validate_key(key)?;
        let bytes = value.encode()?;
        let mut conn = self.conn().await?;
        let full_key = self.full_key(key);

        if expires_in_secs > 0 {
            let _: () = conn.set_ex(full_key, bytes, expires_in_secs).await?;
        } else {
            let _: () = conn.set(full_key, bytes).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(self.full_key(key)).await?;
        Ok(())
    }

    async fn empty_by_match(&self, pattern: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let keys = self.scan_keys(&mut conn, pattern).await?;

        for chunk in keys.chunks(SCAN_BATCH) {
            let _: () = conn.del(chunk.to_vec()).await?;
        }
        debug!(pattern, removed = keys.len(), "redis cache emptied by match");
        Ok(())
    }

    async fn empty(&self) -> Result<()> {
        self.empty_by_match("*").await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
