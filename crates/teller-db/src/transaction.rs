//! # Scoped Transactions
//!
//! Opens a transaction, hands it to a body, and guarantees exactly one of
//! commit or rollback afterwards.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  TransactionManager::with_transaction                   │
//! │                                                                         │
//! │  begin_transaction(isolation, deadline)                                │
//! │       │  Err ──────────────────────────────► ScopeError::Begin         │
//! │       ▼                                                                 │
//! │  body(&mut handle)                                                     │
//! │       │  Err ──► rollback (logged if it fails) ► ScopeError::Body      │
//! │       ▼                                                                 │
//! │  commit (bounded by deadline)                                          │
//! │       │  Err ──────────────────────────────► ScopeError::Commit        │
//! │       ▼                     (outcome unknown: may have been applied)   │
//! │  Ok(value)                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A handle dropped without commit or rollback (for example when the caller's
//! future is cancelled) is rolled back by sqlx when the connection returns to
//! the pool.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{Sqlite, SqliteConnection};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// Default upper bound for one transaction, from begin through commit.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time a rollback gets when the deadline has already passed.
const ROLLBACK_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// Isolation
// =============================================================================

/// Transaction isolation level requested from the store.
///
/// SQLite only offers serializable transactions and ignores the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The `SET TRANSACTION` statement selecting this level.
    pub fn set_transaction_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Backend Contract
// =============================================================================

/// An open transaction.
///
/// `commit` and `rollback` consume the handle, so each can happen at most
/// once.
#[async_trait]
pub trait TransactionHandle: Send + 'static {
    /// Instant after which work in this transaction must be abandoned.
    fn deadline(&self) -> Instant;

    async fn commit(self) -> DbResult<()>;

    async fn rollback(self) -> DbResult<()>;
}

/// Something that can open transactions (a connection pool).
#[async_trait]
pub trait TransactionSource: Send + Sync {
    type Handle: TransactionHandle;

    /// Opens a transaction.
    ///
    /// Fails with `PoolExhausted` when no connection frees up within the
    /// acquire timeout and with `ConnectionFailed` when the store is
    /// unreachable.
    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
        deadline: Instant,
    ) -> DbResult<Self::Handle>;
}

/// Runs `operation`, failing with [`DbError::DeadlineElapsed`] once
/// `deadline` passes.
pub async fn before_deadline<T, F>(deadline: Instant, operation: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match timeout_at(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(DbError::DeadlineElapsed),
    }
}

// =============================================================================
// SQLite Handle
// =============================================================================

/// A SQLite transaction with its deadline.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
    deadline: Instant,
}

impl SqliteTransaction {
    pub(crate) fn new(tx: sqlx::Transaction<'static, Sqlite>, deadline: Instant) -> Self {
        SqliteTransaction { tx, deadline }
    }

    /// The connection the transaction runs on.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }
}

impl fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
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
// Scope Error
// =============================================================================

/// Which phase of a scoped transaction failed.
#[derive(Debug)]
pub enum ScopeError<E> {
    /// No transaction was opened. Nothing happened.
    Begin(DbError),
    /// The body failed and the transaction was rolled back.
    Body(E),
    /// Commit failed. The store may or may not have applied the changes.
    Commit(DbError),
}

impl<E> ScopeError<E> {
    /// True when the failure leaves the store state unknown.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, ScopeError::Commit(_))
    }
}

impl<E: fmt::Display> fmt::Display for ScopeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Begin(e) => write!(f, "failed to begin transaction: {}", e),
            ScopeError::Body(e) => write!(f, "{}", e),
            ScopeError::Commit(e) => write!(f, "failed to commit transaction: {}", e),
        }
    }
}

impl<E> std::error::Error for ScopeError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScopeError::Begin(e) | ScopeError::Commit(e) => Some(e),
            ScopeError::Body(e) => Some(e),
        }
    }
}

// =============================================================================
// Transaction Manager
// =============================================================================

/// Runs bodies inside scoped, deadline-bounded transactions.
///
/// ## Example
/// ```rust,ignore
/// let manager = TransactionManager::new(db.clone());
/// let balance = manager
///     .with_transaction(IsolationLevel::ReadCommitted, move |tx| {
///         Box::pin(async move { repo.lock_for_update(tx, id).await.map(|a| a.balance) })
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct TransactionManager<S> {
    source: S,
    attempt_timeout: Duration,
}

impl<S: TransactionSource> TransactionManager<S> {
    pub fn new(source: S) -> Self {
        TransactionManager {
            source,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Sets the deadline applied to each transaction.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Executes `body` in a new transaction.
    ///
    /// Commits when the body returns `Ok`, rolls back otherwise. The
    /// transaction never outlives this call.
    pub async fn with_transaction<T, E, F>(
        &self,
        isolation: IsolationLevel,
        body: F,
    ) -> Result<T, ScopeError<E>>
    where
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        let deadline = Instant::now() + self.attempt_timeout;

        let mut handle = before_deadline(deadline, self.source.begin_transaction(isolation, deadline))
            .await
            .map_err(ScopeError::Begin)?;

        debug!(%isolation, timeout_ms = self.attempt_timeout.as_millis() as u64, "Transaction opened");

        match body(&mut handle).await {
            Ok(value) => {
                before_deadline(deadline, handle.commit())
                    .await
                    .map_err(ScopeError::Commit)?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                let rollback_deadline = deadline.max(Instant::now() + ROLLBACK_GRACE);
                match before_deadline(rollback_deadline, handle.rollback()).await {
                    Ok(()) => debug!("Transaction rolled back"),
                    Err(rollback_err) => {
                        warn!(error = %rollback_err, "Rollback failed; connection will be discarded")
                    }
                }
                Err(ScopeError::Body(err))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
