//! # PostgreSQL Backend
//!
//! Enabled with the `postgres` feature.
//!
//! ## Row Locks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                 │
//! │  SET TRANSACTION ISOLATION LEVEL READ COMMITTED                        │
//! │  SELECT set_config('lock_timeout', '<remaining>ms', true)              │
//! │  SELECT ... FROM accounts WHERE id = $1 FOR UPDATE                     │
//! │       │                                                                 │
//! │       ├── granted ─► row locked until COMMIT / ROLLBACK                │
//! │       └── waited too long ─► 55P03 lock_not_available (LockTimeout)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock wait is capped at whichever is smaller: the configured lock
//! timeout or the time left before the transaction's deadline.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Postgres;
use tokio::time::Instant;
use tracing::{debug, info};

use teller_core::{Account, AccountId, Amount, NewAccount};

use crate::error::{DbError, DbResult};
use crate::migrations::count_applied;
use crate::pool::{Backend, DbConfig, Store};
use crate::repository::{AccountRepository, AccountRow};
use crate::transaction::{IsolationLevel, TransactionHandle, TransactionSource};

/// Embedded migrations from the `migrations/postgres` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/postgres");

// =============================================================================
// Database
// =============================================================================

/// PostgreSQL database handle.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgDatabase {
    /// Connects and (optionally) migrates.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        if config.backend() != Backend::Postgres {
            return Err(DbError::ConnectionFailed(format!(
                "'{}' is not a PostgreSQL URL",
                config.url
            )));
        }

        info!("Initializing PostgreSQL connection");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.url)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "PostgreSQL pool created"
        );

        let db = PgDatabase {
            pool,
            lock_timeout: config.lock_timeout,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        MIGRATOR.run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn accounts(&self) -> PgAccountRepository {
        PgAccountRepository {
            pool: self.pool.clone(),
            lock_timeout: self.lock_timeout,
        }
    }
}

#[async_trait]
impl TransactionSource for PgDatabase {
    type Handle = PgTransaction;

    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
        deadline: Instant,
    ) -> DbResult<PgTransaction> {
        let mut tx = self.pool.begin().await?;
        // Must be the first statement of the transaction.
        sqlx::query(isolation.set_transaction_sql())
            .execute(&mut *tx)
            .await?;
        Ok(PgTransaction { tx, deadline })
    }
}

#[async_trait]
impl Store for PgDatabase {
    type Accounts = PgAccountRepository;

    fn accounts(&self) -> PgAccountRepository {
        PgDatabase::accounts(self)
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migration_status(&self) -> DbResult<(usize, usize)> {
        let tracked: bool =
            sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        if !tracked {
            return Ok((MIGRATOR.migrations.len(), 0));
        }

        let versions: Vec<i64> =
            sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success")
                .fetch_all(&self.pool)
                .await?;
        Ok(count_applied(&MIGRATOR, &versions))
    }

    async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

// =============================================================================
// Transaction Handle
// =============================================================================

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    deadline: Instant,
}

impl PgTransaction {
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionHandle for PgTransaction {
    fn deadline(&self) -> Instant {
        self.deadline
    }

    async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Account Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
    lock_timeout: Duration,
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    type Tx = PgTransaction;

    async fn lock_for_update(&self, tx: &mut PgTransaction, id: AccountId) -> DbResult<Account> {
        let remaining = tx.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DbError::DeadlineElapsed);
        }
        let wait_ms = remaining.min(self.lock_timeout).as_millis().max(1);

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", wait_ms))
            .execute(tx.connection())
            .await?;

        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, balance, created_at, updated_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.get())
        .fetch_optional(tx.connection())
        .await?;

        match row {
            Some(row) => {
                debug!(account = %id, wait_ms = wait_ms as u64, "Row locked");
                Ok(row.into())
            }
            None => Err(DbError::not_found("Account", id)),
        }
    }

    async fn adjust_balance(
        &self,
        tx: &mut PgTransaction,
        id: AccountId,
        delta: Amount,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + $1,
                updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(delta.minor())
        .bind(Utc::now())
        .bind(id.get())
        .execute(tx.connection())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Account", id));
        }
        Ok(())
    }

    async fn insert(&self, account: &NewAccount) -> DbResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (name, email, balance)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, balance, created_at, updated_at
            "#,
        )
        .bind(account.name())
        .bind(account.email())
        .bind(account.balance().minor())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("email", account.email()),
            other => other,
        })?;

        Ok(row.into())
    }

    async fn get_by_id(&self, id: AccountId) -> DbResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, balance, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    async fn list_all(&self) -> DbResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, balance, created_at, updated_at
            FROM accounts
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn total_balance(&self) -> DbResult<Amount> {
        // SUM(BIGINT) is NUMERIC in PostgreSQL.
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0)::BIGINT FROM accounts")
                .fetch_one(&self.pool)
                .await?;
        Ok(Amount::from_minor(total))
    }
}
