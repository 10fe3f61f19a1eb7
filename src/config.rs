//! Configuration Module
//!
//! Handles loading and managing application configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

// == Cache Backend Kind ==
/// Which cache backend the `CACHE` variable selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Caching disabled
    Disabled,
    /// Networked Redis store
    Redis,
    /// On-disk LMDB store
    Embedded,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::Disabled),
            "redis" => Ok(Self::Redis),
            "badger" | "embedded" => Ok(Self::Embedded),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

// == Redis Config ==
/// Connection and pool parameters for the networked backend.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` of the server
    pub host: String,
    pub password: String,
    /// Namespace prepended to every key
    pub prefix: String,
    /// Idle connections kept by the reaper
    pub max_idle: usize,
    /// Upper bound on connections handed out at once
    pub max_active: usize,
    /// Idle connections older than this are dropped (seconds)
    pub idle_timeout: u64,
    /// How long a borrower waits for a free connection (milliseconds)
    pub wait_timeout_ms: u64,
}

impl RedisConfig {
    /// Connection URL understood by the redis client.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}", self.host)
        } else {
            format!("redis://:{}@{}", self.password, self.host)
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:6379".to_string(),
            password: String::new(),
            prefix: String::new(),
            max_idle: 50,
            max_active: 10_000,
            idle_timeout: 240,
            wait_timeout_ms: 5_000,
        }
    }
}

/// Application configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Used to name cookies (`_<app_name>_remember`)
    pub app_name: String,
    /// HTTP server port
    pub server_port: u16,
    /// Public base URL, used to build and verify signed links
    pub app_url: String,
    /// 32 byte secret for URL signing and field encryption
    pub encryption_key: String,
    pub cache_backend: CacheBackendKind,
    /// Data directory of the embedded store, created on first open
    pub cache_dir: PathBuf,
    /// Upper bound on the embedded store's memory map, in MiB
    pub cache_map_size_mb: usize,
    pub redis: RedisConfig,
    /// Cron expression for embedded store garbage collection
    pub gc_schedule: String,
    /// Minimum free-page fraction before GC compacts the data file
    pub gc_discard_ratio: f64,
    pub cookie_secure: bool,
    pub cookie_domain: Option<String>,
    /// Bearer token lifetime in seconds
    pub token_ttl: u64,
    /// Deadline for a mail job round trip in seconds
    pub mail_timeout: u64,
    pub mail_from: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `APP_NAME` (default: webcore)
    /// - `SERVER_PORT` (default: 3000)
    /// - `APP_URL` (default: http://localhost:3000)
    /// - `KEY` - signing and encryption secret, must be 32 bytes
    /// - `CACHE` - `redis`, `badger`/`embedded`, or empty to disable
    /// - `CACHE_DIR` (default: ./tmp/badger), `CACHE_MAP_SIZE_MB` (default: 1024)
    /// - `REDIS_HOST`, `REDIS_PASSWORD`, `REDIS_PREFIX`
    /// - `REDIS_MAX_IDLE` (50), `REDIS_MAX_ACTIVE` (10000), `REDIS_IDLE_TIMEOUT` (240s)
    /// - `GC_SCHEDULE` (default: @daily)
    /// - `COOKIE_SECURE` (default: true), `COOKIE_DOMAIN`
    /// - `TOKEN_TTL` (default: 86400s)
    /// - `MAIL_TIMEOUT` (default: 10s), `MAIL_FROM`
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let cache_backend = match env::var("CACHE") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.cache_backend,
        };

        Ok(Self {
            app_name: env::var("APP_NAME").unwrap_or(defaults.app_name),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            app_url: env::var("APP_URL").unwrap_or(defaults.app_url),
            encryption_key: env::var("KEY").unwrap_or(defaults.encryption_key),
            cache_backend,
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_map_size_mb: parse_env("CACHE_MAP_SIZE_MB").unwrap_or(defaults.cache_map_size_mb),
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or(defaults.redis.host),
                password: env::var("REDIS_PASSWORD").unwrap_or(defaults.redis.password),
                prefix: env::var("REDIS_PREFIX").unwrap_or(defaults.redis.prefix),
                max_idle: parse_env("REDIS_MAX_IDLE").unwrap_or(defaults.redis.max_idle),
                max_active: parse_env("REDIS_MAX_ACTIVE").unwrap_or(defaults.redis.max_active),
                idle_timeout: parse_env("REDIS_IDLE_TIMEOUT")
                    .unwrap_or(defaults.redis.idle_timeout),
                wait_timeout_ms: parse_env("REDIS_WAIT_TIMEOUT_MS")
                    .unwrap_or(defaults.redis.wait_timeout_ms),
            },
            gc_schedule: env::var("GC_SCHEDULE").unwrap_or(defaults.gc_schedule),
            gc_discard_ratio: parse_env("GC_DISCARD_RATIO").unwrap_or(defaults.gc_discard_ratio),
            cookie_secure: env::var("COOKIE_SECURE")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.cookie_secure),
            cookie_domain: env::var("COOKIE_DOMAIN").ok().filter(|d| !d.is_empty()),
            token_ttl: parse_env("TOKEN_TTL").unwrap_or(defaults.token_ttl),
            mail_timeout: parse_env("MAIL_TIMEOUT").unwrap_or(defaults.mail_timeout),
            mail_from: env::var("MAIL_FROM").unwrap_or(defaults.mail_from),
        })
    }

    /// Name of the remember-me cookie.
    pub fn remember_cookie_name(&self) -> String {
        format!("_{}_remember", self.app_name)
    }

    /// Name of the session cookie.
    pub fn session_cookie_name(&self) -> String {
        format!("_{}_session", self.app_name)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "webcore".to_string(),
            server_port: 3000,
            app_url: "http://localhost:3000".to_string(),
            encryption_key: "change-me-change-me-change-me-32".to_string(),
            cache_backend: CacheBackendKind::Disabled,
            cache_dir: PathBuf::from("./tmp/badger"),
            cache_map_size_mb: 1024,
            redis: RedisConfig::default(),
            gc_schedule: "@daily".to_string(),
            gc_discard_ratio: 0.7,
            cookie_secure: true,
            cookie_domain: None,
            token_ttl: 24 * 60 * 60,
            mail_timeout: 10,
            mail_from: "admin@example.com".to_string(),
        }
    }
}
