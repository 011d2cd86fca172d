//! # Database Handle
//!
//! Opens the SQLite file behind a small connection pool and hands out
//! repositories.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Opening the Store                               │
//! │                                                                         │
//! │  IngestConfig.database ──► DbConfig ──► Database::new                  │
//! │                                              │                          │
//! │            ┌─────────────────────────────────┼─────────────────────┐    │
//! │            │ 1. mkdir -p parent of the file  │                     │    │
//! │            │ 2. WAL, synchronous=NORMAL,     ▼                     │    │
//! │            │    foreign_keys=ON, busy 5s   SqlitePool              │    │
//! │            │ 3. embedded migrations          │                     │    │
//! │            └─────────────────────────────────┼─────────────────────┘    │
//! │                                              ▼                          │
//! │         stores() receipts() products() users() payments()              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The CLI batch and the upload server may run against the same file at
//! once; WAL lets lookups proceed while one of them holds the write lock.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::payment::PaymentRepository;
use crate::repository::product::ProductRepository;
use crate::repository::receipt::ReceiptRepository;
use crate::repository::store::StoreRepository;
use crate::repository::user::UserRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the receipt database.
///
/// ```rust,ignore
/// let config = DbConfig::new("data/paragon.db").max_connections(2);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool size. Default 5.
    pub max_connections: u32,

    /// How long a caller waits for a free connection. Default 30s.
    pub acquire_timeout: Duration,

    /// How long SQLite retries a locked database before failing. Default 5s.
    pub busy_timeout: Duration,

    /// Apply embedded migrations on open. Default true.
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed configuration; the file and its parent folder are
    /// created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory database for tests.
    ///
    /// Every connection to `:memory:` is its own database, so the pool is
    /// pinned to one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            ..DbConfig::new(MEMORY_PATH)
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

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

fn ensure_parent_dir(path: &Path) -> DbResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!(dir = %parent.display(), "Creating database directory");
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::ConnectionFailed(format!("cannot create {}: {}", parent.display(), e))
            })
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the receipt database.
///
/// Clones share one pool. Repositories are created on demand and are as
/// cheap as the pool clone inside them.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database described by `config`.
    ///
    /// ## Returns
    /// * `Ok(Database)` - pool connected and, unless disabled, migrated
    /// * `Err(DbError::ConnectionFailed)` - file or folder not usable
    /// * `Err(DbError::MigrationFailed)` - schema could not be applied
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening receipt database");

        if !config.is_in_memory() {
            ensure_parent_dir(&config.database_path)?;
        }

        let mut options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // Dropping the only connection drops the database with it
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Pool connected");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies pending embedded migrations. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool, for queries that span repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn stores(&self) -> StoreRepository {
        StoreRepository::new(self.pool.clone())
    }

    /// Receipt lookups and the atomic `persist_receipt` transaction.
    pub fn receipts(&self) -> ReceiptRepository {
        ReceiptRepository::new(self.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Household members, including the "Other" sentinel.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Payment label mappings and the ignore list.
    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone())
    }

    /// Closes every connection; later queries fail.
    pub async fn close(&self) {
        info!("Closing receipt database");
        self.pool.close().await;
    }

    /// True when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_usable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_in_memory_config_pins_one_connection() {
        let config = DbConfig::in_memory().max_connections(1);
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 1);
        assert!(config.run_migrations);

        let config = DbConfig::new("data/paragon.db").run_migrations(false);
        assert!(!config.is_in_memory());
        assert_eq!(config.max_connections, 5);
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("paragon.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert!(db.health_check().await);
        db.close().await;

        assert!(path.exists());
    }
}
