//! # Database Connection Pool
//!
//! Manages the store connection pool and configuration.
//!
//! ## Pool Sizing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Connection Pool                                  │
//! │                                                                         │
//! │   transfer task ──┐                                                    │
//! │   transfer task ──┼──► acquire (≤ 3s) ──► [ conn │ conn │ ... ] max 10 │
//! │   transfer task ──┘                        min 5 kept open             │
//! │                                            recycled after 5 min        │
//! │                                                                         │
//! │  One transfer holds one connection from begin to commit/rollback.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLite Settings
//! - WAL journal: readers don't block the single writer
//! - `busy_timeout`: how long a writer waits for the write lock before the
//!   store reports `SQLITE_BUSY` (surfaced as a lock timeout)
//! - Foreign keys on

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{AccountRepository, SqliteAccountRepository};
use crate::transaction::{IsolationLevel, SqliteTransaction, TransactionSource};

// =============================================================================
// Configuration
// =============================================================================

/// Which store a [`DbConfig`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    /// `postgres://` and `postgresql://` URLs select PostgreSQL; anything
    /// else is a SQLite URL or file path.
    pub fn detect(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Backend::Postgres
        } else {
            Backend::Sqlite
        }
    }
}

/// Database configuration.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use teller_db::DbConfig;
///
/// let config = DbConfig::new("./teller.db")
///     .max_connections(20)
///     .lock_timeout(Duration::from_secs(2));
/// assert_eq!(config.min_connections, 5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file path, `sqlite:` URL, or `postgres://` URL.
    pub url: String,

    /// Maximum number of connections in the pool.
    /// Default: 10
    pub max_connections: u32,

    /// Connections kept open while idle.
    /// Default: 5
    pub min_connections: u32,

    /// How long to wait for a free connection.
    /// Default: 3 seconds
    pub acquire_timeout: Duration,

    /// Idle connections above `min_connections` close after this.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Connections are recycled after this age.
    /// Default: 5 minutes
    pub max_lifetime: Option<Duration>,

    /// Upper bound on a single lock wait (SQLite `busy_timeout`,
    /// PostgreSQL `lock_timeout`).
    /// Default: 5 seconds
    pub lock_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for the given path or URL.
    ///
    /// A SQLite file is created if it doesn't exist.
    pub fn new(url: impl Into<String>) -> Self {
        DbConfig {
            url: url.into(),
            max_connections: 10,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(300)),
            lock_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the pool acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Sets the per-lock wait bound.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// ```
    ///
    /// Every SQLite connection to `:memory:` is its own database, so the
    /// pool holds exactly one connection that never expires. Concurrency
    /// tests need a file-backed database instead.
    pub fn in_memory() -> Self {
        DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
            max_lifetime: None,
            lock_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn backend(&self) -> Backend {
        Backend::detect(&self.url)
    }

    fn sqlite_connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(&self.url)
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(&self.url)
        };

        Ok(options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true)
            .busy_timeout(self.lock_timeout))
    }
}

// =============================================================================
// Store Contract
// =============================================================================

/// A connected store: opens transactions and hands out its account
/// repository.
///
/// Implemented by [`Database`] (SQLite) and, with the `postgres` feature,
/// by `PgDatabase`.
#[async_trait]
pub trait Store: TransactionSource + Clone + 'static {
    type Accounts: AccountRepository<Tx = Self::Handle>;

    fn accounts(&self) -> Self::Accounts;

    /// Round-trips `SELECT 1`.
    async fn ping(&self) -> DbResult<()>;

    /// (total, applied) migration counts.
    async fn migration_status(&self) -> DbResult<(usize, usize)>;

    async fn close(&self);
}

// =============================================================================
// Database
// =============================================================================

/// SQLite database handle.
///
/// Cheap to clone: clones share one pool. Construct one per process and
/// pass it to whatever needs it.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures WAL, NORMAL synchronous, foreign keys, busy_timeout
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        if config.backend() != Backend::Sqlite {
            return Err(DbError::ConnectionFailed(format!(
                "'{}' is not a SQLite path or URL",
                config.url
            )));
        }

        info!(url = %config.url, "Initializing database connection");

        let connect_options = config.sqlite_connect_options()?;

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            lock_timeout_ms = config.lock_timeout.as_millis() as u64,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await?;
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the account repository.
    pub fn accounts(&self) -> SqliteAccountRepository {
        SqliteAccountRepository::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Executes `SELECT 1`, bounded by the pool's acquire timeout.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionSource for Database {
    type Handle = SqliteTransaction;

    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
        deadline: Instant,
    ) -> DbResult<SqliteTransaction> {
        // SQLite transactions are serializable whatever is requested.
        trace!(%isolation, "Beginning SQLite transaction");
        let tx = self.pool.begin().await?;
        Ok(SqliteTransaction::new(tx, deadline))
    }
}

#[async_trait]
impl Store for Database {
    type Accounts = SqliteAccountRepository;

    fn accounts(&self) -> SqliteAccountRepository {
        Database::accounts(self)
    }

    async fn ping(&self) -> DbResult<()> {
        Database::ping(self).await
    }

    async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }

    async fn close(&self) {
        Database::close(self).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
