//! Application assembly.
//!
//! Builds every shared handle from `Config`, starts background work and
//! tears it down again on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{create_router, AppState};
use crate::auth::MemoryStore;
use crate::cache::{open_cache, Backend};
use crate::config::Config;
use crate::mail::{LogTransport, Mailer};
use crate::tasks::{register_store_gc, Scheduler};

pub struct App {
    pub state: AppState,
    pub scheduler: Scheduler,
    background: Vec<JoinHandle<()>>,
}

impl App {
    /// Opens the configured cache, registers its upkeep and starts the mail worker.
    ///
    /// Fails when the requested cache cannot be opened or the GC schedule
    /// does not parse. Must run inside a tokio runtime.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let backend = open_cache(&config).context("failed to open cache")?;
        let scheduler = Scheduler::new();
        let mut background = Vec::new();

        match &backend {
            Some(Backend::Embedded(cache)) => {
                register_store_gc(
                    &scheduler,
                    cache.store(),
                    &config.gc_schedule,
                    config.gc_discard_ratio,
                )
                .context("failed to schedule embedded store gc")?;
            }
            Some(Backend::Redis(cache)) => {
                background.push(cache.spawn_idle_reaper(
                    config.redis.max_idle,
                    Duration::from_secs(config.redis.idle_timeout),
                ));
            }
            None => info!("caching disabled"),
        }

        let (mailer, mail_worker) =
            Mailer::spawn(LogTransport, Duration::from_secs(config.mail_timeout));
        background.push(mail_worker);

        let state = AppState::new(config, backend, Arc::new(MemoryStore::new()), mailer)
            .context("failed to initialise credentials")?;

        Ok(Self {
            state,
            scheduler,
            background,
        })
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Stops scheduled jobs and background tasks, then flushes the embedded store.
    pub async fn shutdown(self) {
        self.scheduler.shutdown();
        for handle in &self.background {
            handle.abort();
        }

        if let Some(cache) = &self.state.embedded {
            if let Err(e) = cache.close().await {
                warn!(error = %e, "failed to flush embedded cache");
            }
        }
        info!("background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheBackendKind;
    use crate::tasks::gc::GC_JOB;

    fn embedded_config(dir: &tempfile::TempDir) -> Config {
        Config {
            cache_backend: CacheBackendKind::Embedded,
            cache_dir: dir.path().join("badger"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_build_embedded_schedules_gc() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(embedded_config(&dir)).unwrap();

        assert_eq!(app.scheduler.jobs(), vec![GC_JOB.to_string()]);
        assert_eq!(app.state.cache().unwrap().backend(), "embedded");
        assert!(dir.path().join("badger").exists());

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_gc_schedule_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            gc_schedule: "sometimes".to_string(),
            ..embedded_config(&dir)
        };
        assert!(App::build(config).is_err());
    }

    #[tokio::test]
    async fn test_build_without_cache() {
        let app = App::build(Config::default()).unwrap();
        assert!(app.state.cache.is_none());
        assert!(app.scheduler.jobs().is_empty());
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_short_key_rejected() {
        let config = Config {
            encryption_key: "too-short".to_string(),
            ..Config::default()
        };
        assert!(App::build(config).is_err());
    }
}
