//! # Database Connection Pool Module
//!
//! Opens the SQLite database that holds every piece of backup state: rate
//! limits, the download queue, rescan cursors, file records and the download
//! error log.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_backup::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("/var/lib/backup/state.db")).await?;
//! ```
//!
//! `create_pool` also creates any missing tables, so a fresh file is usable
//! right away.

use crate::download_queue::SqliteDownloadScheduler;
use crate::files::SqliteFileRecordRepository;
use crate::limiter::SqliteRateLimiter;
use crate::rescan::SqliteRescanScheduler;
use crate::{BackupError, Result};
use bridge_traits::time::SystemClock;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database file, or `sqlite::memory:`
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// In-memory database for tests.
    ///
    /// Every SQLite connection to `:memory:` opens its own empty database, so
    /// the pool is pinned to a single connection that never expires.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the pool, create the schema and verify the connection.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| BackupError::Database(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            BackupError::Database(e.to_string())
        })?;

    initialize_schema(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Create every backup table that does not exist yet.
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    SqliteRateLimiter::new(pool.clone(), Arc::new(SystemClock))
        .initialize()
        .await?;
    SqliteDownloadScheduler::new(pool.clone()).initialize().await?;
    SqliteRescanScheduler::new(pool.clone()).initialize().await?;
    SqliteFileRecordRepository::new(pool.clone(), Arc::new(SystemClock))
        .initialize()
        .await?;

    debug!("Backup schema initialized");
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Database health check failed");
            BackupError::Database(e.to_string())
        })?;
    Ok(())
}
