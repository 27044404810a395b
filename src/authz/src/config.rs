//! Engine configuration loading

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    /// Connection settings for the PostgreSQL store, when one is used
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Authorization cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Lifetime of a compiled policy index in milliseconds. Zero rebuilds on
    /// every query.
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

impl CacheConfig {
    /// A non-zero TTL below one millisecond is rounded up to one millisecond
    pub fn with_ttl(ttl: Duration) -> Self {
        let mut ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl_ms == 0 && !ttl.is_zero() {
            ttl_ms = 1;
        }
        Self { ttl_ms }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

/// PostgreSQL pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// - `RBAC_CACHE_TTL_SECS` - policy index TTL in seconds (default: 60)
    /// - `DATABASE_URL` - PostgreSQL connection string (no database when unset)
    /// - `DATABASE_MAX_CONNECTIONS` - pool size (default: 25)
    /// - `DATABASE_MIN_CONNECTIONS` - idle floor (default: 5, capped at the pool size)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ttl) = lookup("RBAC_CACHE_TTL_SECS") {
            let secs: u64 = parse_var("RBAC_CACHE_TTL_SECS", &ttl)?;
            config.cache = CacheConfig::with_ttl(Duration::from_secs(secs));
        }

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            let mut database = DatabaseConfig::new(url);
            if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
                database.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &max)?;
            }
            match lookup("DATABASE_MIN_CONNECTIONS") {
                Some(min) => {
                    database.min_connections = parse_var("DATABASE_MIN_CONNECTIONS", &min)?;
                }
                // The default floor follows a smaller pool size down
                None => {
                    database.min_connections =
                        database.min_connections.min(database.max_connections);
                }
            }
            config.database = Some(database);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if let Some(database) = &self.database {
            if database.max_connections == 0 {
                return Err(AuthzError::Config(
                    "database.max_connections must be at least 1".to_string(),
                ));
            }
            if database.min_connections > database.max_connections {
                return Err(AuthzError::Config(format!(
                    "database.min_connections ({}) exceeds max_connections ({})",
                    database.min_connections, database.max_connections
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AuthzError::Config(format!("{} has invalid value '{}'", key, value)))
}

fn default_cache_ttl_ms() -> u64 {
    60_000
}

fn default_max_connections() -> u32 {
    25
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    3
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}
