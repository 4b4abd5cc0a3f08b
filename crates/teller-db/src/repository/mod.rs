//! # Repository Module
//!
//! Account storage behind one contract shared by every backend.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    AccountRepository                                    │
//! │                                                                         │
//! │  TransferCoordinator (inside a transaction)                           │
//! │       │                                                                 │
//! │       │  lock_for_update(tx, id)      exclusive until commit/rollback  │
//! │       │  adjust_balance(tx, id, Δ)    on a row this tx already locked  │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────┐   ┌──────────────────────────┐          │
//! │  │ SqliteAccountRepository  │   │ PgAccountRepository      │          │
//! │  │ write lock via UPDATE    │   │ SELECT ... FOR UPDATE    │          │
//! │  └──────────────────────────┘   └──────────────────────────┘          │
//! │                                                                         │
//! │  CLI / seeding (no transaction, straight to the pool)                  │
//! │       insert • get_by_id • list_all • total_balance                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`SqliteAccountRepository`] - SQLite backend
//! - `PgAccountRepository` - PostgreSQL backend (`postgres` feature)

pub mod account;

pub use account::SqliteAccountRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use teller_core::{Account, AccountId, Amount, NewAccount};

use crate::error::DbResult;
use crate::transaction::TransactionHandle;

/// Reads and mutates account rows.
///
/// The `*_for_update` and `adjust_balance` operations run inside the
/// caller's transaction; the rest are single statements on the pool.
#[async_trait]
pub trait AccountRepository: Clone + Send + Sync + 'static {
    /// The transaction handle this repository runs locked operations in.
    type Tx: TransactionHandle;

    /// Locks the row exclusively for the rest of the transaction and
    /// returns its current state.
    ///
    /// Waits until the lock is granted or the store's lock wait bound
    /// passes (`DbError::LockTimeout`). `DbError::NotFound` if absent.
    async fn lock_for_update(&self, tx: &mut Self::Tx, id: AccountId) -> DbResult<Account>;

    /// Applies `balance += delta` to a row this transaction has locked.
    ///
    /// Does not check the resulting balance; the schema CHECK is the only
    /// guard here. `DbError::NotFound` if no row was updated.
    async fn adjust_balance(&self, tx: &mut Self::Tx, id: AccountId, delta: Amount)
        -> DbResult<()>;

    /// Inserts an account. `DbError::UniqueViolation` on a duplicate email.
    async fn insert(&self, account: &NewAccount) -> DbResult<Account>;

    async fn get_by_id(&self, id: AccountId) -> DbResult<Option<Account>>;

    /// All accounts ordered by id.
    async fn list_all(&self) -> DbResult<Vec<Account>>;

    /// Sum of every balance.
    async fn total_balance(&self) -> DbResult<Amount>;
}

/// Raw `accounts` row.
#[derive(Debug, FromRow)]
pub(crate) struct AccountRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::new(row.id),
            name: row.name,
            email: row.email,
            balance: Amount::from_minor(row.balance),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
