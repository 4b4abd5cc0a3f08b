//! # Database and Transfer Error Types
//!
//! Error types for store operations and for the transfer engine.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite / PostgreSQL error (sqlx::Error)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Categorized by SQLSTATE / SQLite code         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TransferError (this module) ← Adds step, attempts, outcome            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CLI prints kind + message, exits non-zero                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

use teller_core::{AccountId, Amount, TransferStep, ValidationError};

// =============================================================================
// Database Error
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and classify them so the transfer engine
/// can decide between retrying, timing out and giving up.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `lock_for_update` on an id with no row
    /// - `adjust_balance` updated zero rows
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation (duplicate email).
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// CHECK constraint violation.
    ///
    /// ## When This Occurs
    /// - A balance write would make `balance < 0`. The engine checks funds
    ///   before writing, so reaching this means a rule was bypassed.
    #[error("Check constraint violated: {0}")]
    CheckViolation(String),

    /// The store aborted the transaction because of concurrent access.
    ///
    /// ## When This Occurs
    /// ```text
    /// PostgreSQL  40001  serialization_failure
    ///             40P01  deadlock_detected
    /// SQLite      517    SQLITE_BUSY_SNAPSHOT
    ///             6/262  SQLITE_LOCKED
    /// ```
    /// Safe to retry the whole transaction.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// A lock was not granted within the store's lock wait bound.
    ///
    /// ## When This Occurs
    /// ```text
    /// PostgreSQL  55P03  lock_not_available (lock_timeout)
    ///             57014  query_canceled (statement_timeout)
    /// SQLite      5      SQLITE_BUSY after busy_timeout
    /// ```
    #[error("Lock wait timed out: {0}")]
    LockTimeout(String),

    /// The transaction's deadline passed before the operation finished.
    #[error("Transaction deadline elapsed")]
    DeadlineElapsed,

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created or opened
    /// - PostgreSQL server unreachable
    /// - Pool closed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit/rollback failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (no connection within the acquire timeout).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for failures where retrying the whole transaction can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    /// True for lock-wait and deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DbError::LockTimeout(_) | DbError::DeadlineElapsed)
    }

    /// True when the store could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, DbError::PoolExhausted | DbError::ConnectionFailed(_))
    }
}

/// Classifies a raw store error code.
///
/// PostgreSQL reports five-character SQLSTATEs; SQLite reports its extended
/// result code as a decimal string.
fn classify_code(code: &str, message: &str) -> Option<DbError> {
    match code {
        "40001" | "40P01" | "517" | "6" | "262" => Some(DbError::Conflict(message.to_string())),
        "55P03" | "57014" | "5" | "261" | "773" => Some(DbError::LockTimeout(message.to_string())),
        _ => None,
    }
}

fn classify_database_error(db_err: &dyn DatabaseError) -> DbError {
    let message = db_err.message();

    if let Some(classified) = db_err
        .code()
        .as_deref()
        .and_then(|code| classify_code(code, message))
    {
        return classified;
    }

    match db_err.kind() {
        ErrorKind::UniqueViolation => {
            // SQLite: "UNIQUE constraint failed: accounts.email"
            // PostgreSQL: constraint name, e.g. "accounts_email_key"
            let field = message
                .split("UNIQUE constraint failed: ")
                .nth(1)
                .or_else(|| db_err.constraint())
                .unwrap_or("unknown")
                .to_string();
            DbError::UniqueViolation {
                field,
                value: "unknown".to_string(),
            }
        }
        ErrorKind::CheckViolation => DbError::CheckViolation(message.to_string()),
        _ => DbError::QueryFailed(message.to_string()),
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → code / constraint kind (see classify_code)
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// sqlx::Error::Io / Tls       → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => classify_database_error(db_err.as_ref()),

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            sqlx::Error::Tls(e) => DbError::ConnectionFailed(e.to_string()),

            sqlx::Error::WorkerCrashed => {
                DbError::ConnectionFailed("Database worker crashed".to_string())
            }

            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Transfer Error
// =============================================================================

/// Why a transfer did not complete.
///
/// Every variant except those at the `commit` step guarantees that no
/// balance changed. Use [`TransferError::outcome`] rather than matching on
/// the step directly.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Amount is zero or negative. Raised before any transaction opens.
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[source] ValidationError),

    /// Sender equals receiver, or the credit would overflow the receiver.
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        reason: String,
        step: Option<TransferStep>,
    },

    /// One of the accounts does not exist.
    #[error("Account {account} not found (step: {step})")]
    NotFound {
        account: AccountId,
        step: TransferStep,
    },

    /// The sender's locked balance does not cover the amount.
    #[error("Insufficient funds in account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    /// The store kept aborting the transaction; retries exhausted.
    #[error("Transfer conflicted {attempts} time(s) (last step: {step}): {source}")]
    Conflict {
        attempts: u32,
        step: TransferStep,
        #[source]
        source: DbError,
    },

    /// A lock or the attempt deadline timed out.
    #[error("Transfer timed out (step: {step}): {source}")]
    Timeout {
        step: TransferStep,
        #[source]
        source: DbError,
    },

    /// The store could not be reached.
    #[error("Connection error (step: {step}): {source}")]
    Connection {
        step: TransferStep,
        #[source]
        source: DbError,
    },

    /// Any other store failure.
    #[error("Transaction error (step: {step}): {source}")]
    Transaction {
        step: TransferStep,
        #[source]
        source: DbError,
    },
}

/// Stable, machine-readable classification of a [`TransferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferErrorKind {
    InvalidAmount,
    InvalidRequest,
    NotFound,
    InsufficientFunds,
    Conflict,
    Timeout,
    Connection,
    Transaction,
}

impl TransferErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferErrorKind::InvalidAmount => "invalid-amount",
            TransferErrorKind::InvalidRequest => "invalid-request",
            TransferErrorKind::NotFound => "not-found",
            TransferErrorKind::InsufficientFunds => "insufficient-funds",
            TransferErrorKind::Conflict => "conflict",
            TransferErrorKind::Timeout => "timeout",
            TransferErrorKind::Connection => "connection",
            TransferErrorKind::Transaction => "transaction",
        }
    }
}

impl std::fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failed transfer did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferOutcome {
    /// Rolled back or never started. Balances are untouched.
    NoEffect,
    /// Failed while committing. The store may or may not have applied it.
    Indeterminate,
}

impl TransferError {
    pub fn kind(&self) -> TransferErrorKind {
        match self {
            TransferError::InvalidAmount(_) => TransferErrorKind::InvalidAmount,
            TransferError::InvalidRequest { .. } => TransferErrorKind::InvalidRequest,
            TransferError::NotFound { .. } => TransferErrorKind::NotFound,
            TransferError::InsufficientFunds { .. } => TransferErrorKind::InsufficientFunds,
            TransferError::Conflict { .. } => TransferErrorKind::Conflict,
            TransferError::Timeout { .. } => TransferErrorKind::Timeout,
            TransferError::Connection { .. } => TransferErrorKind::Connection,
            TransferError::Transaction { .. } => TransferErrorKind::Transaction,
        }
    }

    /// The step the failure was detected at; `None` for pre-transaction rejections.
    pub fn step(&self) -> Option<TransferStep> {
        match self {
            TransferError::InvalidAmount(_) => None,
            TransferError::InvalidRequest { step, .. } => *step,
            TransferError::NotFound { step, .. } => Some(*step),
            TransferError::InsufficientFunds { .. } => Some(TransferStep::Validate),
            TransferError::Conflict { step, .. }
            | TransferError::Timeout { step, .. }
            | TransferError::Connection { step, .. }
            | TransferError::Transaction { step, .. } => Some(*step),
        }
    }

    /// Whether the store may have applied the transfer.
    ///
    /// A conflict is an explicit abort from the store, so it never leaves an
    /// effect even when reported at commit.
    pub fn outcome(&self) -> TransferOutcome {
        match self {
            TransferError::Conflict { .. } => TransferOutcome::NoEffect,
            _ if self.step() == Some(TransferStep::Commit) => TransferOutcome::Indeterminate,
            _ => TransferOutcome::NoEffect,
        }
    }

    /// Maps a store failure at `step` to the caller-facing category.
    pub(crate) fn from_store(step: TransferStep, attempts: u32, source: DbError) -> Self {
        match source {
            DbError::Conflict(_) => TransferError::Conflict {
                attempts,
                step,
                source,
            },
            DbError::LockTimeout(_) | DbError::DeadlineElapsed => {
                TransferError::Timeout { step, source }
            }
            DbError::PoolExhausted | DbError::ConnectionFailed(_) => {
                TransferError::Connection { step, source }
            }
            _ => TransferError::Transaction { step, source },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
