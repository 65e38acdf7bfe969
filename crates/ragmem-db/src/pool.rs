//! Postgres connection pool.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use ragmem_core::defaults::{DB_ACQUIRE_TIMEOUT_SECS, DB_MAX_CONNECTIONS, DB_MIN_CONNECTIONS};
use ragmem_core::{env, Error, Result};

/// Idle connections are closed after this long.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Sizing and timeouts for [`connect_pool`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a query waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: DB_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DB_MAX_CONNECTIONS` | `10` |
    /// | `DB_MIN_CONNECTIONS` | `1` |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` |
    /// | `DB_IDLE_TIMEOUT_SECS` | `600` |
    pub fn from_env() -> Result<Self> {
        let config = Self {
            max_connections: env::parse_or("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
            min_connections: env::parse_or("DB_MIN_CONNECTIONS", DB_MIN_CONNECTIONS)?,
            acquire_timeout: Duration::from_secs(env::parse_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                DB_ACQUIRE_TIMEOUT_SECS,
            )?),
            idle_timeout: Duration::from_secs(env::parse_or(
                "DB_IDLE_TIMEOUT_SECS",
                DB_IDLE_TIMEOUT_SECS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be positive".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Open a pool against `database_url`.
pub async fn connect_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool connected"
    );
    Ok(pool)
}

/// Log pool occupancy; warns when every connection is checked out.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();
    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool occupancy"
    );
    if size > 0 && idle == 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "No idle database connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, DB_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DB_MIN_CONNECTIONS);
        assert_eq!(config.idle_timeout, Duration::from_secs(DB_IDLE_TIMEOUT_SECS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = PoolConfig::default()
            .with_max_connections(20)
            .with_min_connections(5)
            .with_acquire_timeout(Duration::from_secs(60));
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());

        assert!(matches!(
            PoolConfig::default().with_max_connections(0).validate(),
            Err(Error::Config(_))
        ));
        assert!(PoolConfig::default()
            .with_max_connections(2)
            .with_min_connections(3)
            .validate()
            .is_err());
    }
}
