//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::time::Duration;

use redis::{
    ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo, RedisResult,
};

use crate::cache::{DEFAULT_MAX_SIZE, DEFAULT_TTL_MS};

/// Default namespace for remote keys
pub const DEFAULT_KEY_PREFIX: &str = "cache:";

// == Remote Store Config ==
/// Connection parameters for the Redis-compatible remote tier.
///
/// `url` takes precedence over `host`/`port`/`password`/`db`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStoreConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Namespace prepended to every key
    pub key_prefix: String,
    /// Upper bound for the single connection attempt
    pub connect_timeout: Duration,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: 6379,
            password: None,
            db: 0,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RemoteStoreConfig {
    /// Creates a config pointing at a connection URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Returns true if a URL or host is configured.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.host.is_some()
    }

    /// Resolves connection parameters, or None when nothing is configured.
    ///
    /// Host parts go into the struct directly, so passwords need no URL escaping.
    pub fn connection_info(&self) -> Option<RedisResult<ConnectionInfo>> {
        if let Some(url) = &self.url {
            return Some(url.as_str().into_connection_info());
        }
        let host = self.host.as_ref()?;
        Some(Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        }))
    }

    /// Loads remote settings from `REDIS_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            host: env::var("REDIS_HOST").ok().filter(|v| !v.is_empty()),
            port: parse_env("REDIS_PORT").unwrap_or(defaults.port),
            password: env::var("REDIS_PASSWORD").ok().filter(|v| !v.is_empty()),
            db: parse_env("REDIS_DB").unwrap_or(defaults.db),
            key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

// == Layers ==
/// Independently toggles each cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
    pub memory: bool,
    pub redis: bool,
}

// == Cache Config ==
/// Options for building a [`CacheManager`](crate::manager::CacheManager).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Local size budget in bytes
    pub max_size: usize,
    /// TTL applied when callers do not supply one
    pub default_ttl: Duration,
    pub layers: Layers,
    pub remote: RemoteStoreConfig,
    /// Makes concurrent misses on one key share a single computation
    pub coalesce_misses: bool,
    /// Interval of the background prune sweep
    pub prune_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl: Duration::from_millis(DEFAULT_TTL_MS),
            layers: Layers {
                memory: true,
                redis: false,
            },
            remote: RemoteStoreConfig::default(),
            coalesce_misses: false,
            prune_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Memory-only configuration with the given budget.
    pub fn memory_only(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Sets the remote tier and enables it (`useRedis` semantics).
    pub fn with_remote(mut self, remote: RemoteStoreConfig) -> Self {
        self.layers.redis = remote.is_configured();
        self.remote = remote;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Local budget in bytes (default: 100 MiB)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_PRUNE_INTERVAL` - Prune sweep interval in seconds (default: 60)
    /// - `CACHE_USE_REDIS` - Force the remote tier on or off
    /// - `REDIS_URL`, `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`,
    ///   `REDIS_KEY_PREFIX` - Remote connection; memory-only when unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let remote = RemoteStoreConfig::from_env();
        let use_redis = parse_env("CACHE_USE_REDIS").unwrap_or(remote.is_configured());

        Self {
            max_size: parse_env("CACHE_MAX_SIZE").unwrap_or(defaults.max_size),
            default_ttl: parse_env("CACHE_DEFAULT_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_ttl),
            layers: Layers {
                memory: true,
                redis: use_redis,
            },
            remote,
            coalesce_misses: parse_env("CACHE_COALESCE_MISSES")
                .unwrap_or(defaults.coalesce_misses),
            prune_interval: parse_env("CACHE_PRUNE_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.prune_interval),
        }
    }
}

// == Server Config ==
/// Configuration for the admin server binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    pub cache: CacheConfig,
}

impl Config {
    /// Loads server and cache configuration from environment variables.
    ///
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        Self {
            server_port: parse_env("SERVER_PORT").unwrap_or(3000),
            cache: CacheConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
