//! # teller-db: Store and Transfer Engine for Teller
//!
//! This crate owns every database operation: the connection pool,
//! migrations, the account repository, scoped transactions and the
//! transfer coordinator built on them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Teller Data Flow                                 │
//! │                                                                         │
//! │  teller transfer 1 2 15.00                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     teller-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────────────┐                                       │   │
//! │  │   │ TransferCoordinator │  validate • lock order • retries     │   │
//! │  │   └─────────┬───────────┘                                       │   │
//! │  │             ▼                                                   │   │
//! │  │   ┌─────────────────────┐    ┌──────────────────────┐          │   │
//! │  │   │ TransactionManager  │───►│  AccountRepository   │          │   │
//! │  │   │ begin/commit/       │    │  lock_for_update     │          │   │
//! │  │   │ rollback, deadline  │    │  adjust_balance      │          │   │
//! │  │   └─────────┬───────────┘    └──────────┬───────────┘          │   │
//! │  │             ▼                           ▼                       │   │
//! │  │   ┌─────────────────────────────────────────────────┐          │   │
//! │  │   │  Database (SQLite, WAL)  │  PgDatabase (feature) │          │   │
//! │  │   └─────────────────────────────────────────────────┘          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use teller_db::{Database, DbConfig, TransferCoordinator};
//! use teller_core::{AccountId, Amount};
//!
//! let db = Database::new(DbConfig::new("./teller.db")).await?;
//! let transfers = TransferCoordinator::from_store(&db);
//!
//! let receipt = transfers
//!     .transfer(AccountId::new(1), AccountId::new(2), Amount::from_major(15))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod seed;
pub mod transaction;
pub mod transfer;

#[cfg(feature = "postgres")]
pub mod postgres;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, TransferError, TransferErrorKind, TransferOutcome};
pub use pool::{Backend, Database, DbConfig, Store};
pub use repository::{AccountRepository, SqliteAccountRepository};
pub use transaction::{
    IsolationLevel, ScopeError, SqliteTransaction, TransactionHandle, TransactionManager,
    TransactionSource, DEFAULT_ATTEMPT_TIMEOUT,
};
pub use transfer::{RetryPolicy, TransferCoordinator};

#[cfg(feature = "postgres")]
pub use postgres::{PgAccountRepository, PgDatabase, PgTransaction};
