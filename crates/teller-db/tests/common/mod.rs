//! Shared helpers for the teller-db integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use teller_core::{Account, AccountId, Amount, NewAccount};
use teller_db::{
    AccountRepository, Database, DbConfig, DbError, DbResult, SqliteAccountRepository,
    SqliteTransaction,
};

/// A file-backed database that lives as long as this value.
///
/// `:memory:` databases allow a single connection, which would hide every
/// locking behaviour these tests care about.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

pub async fn file_db() -> TestDb {
    file_db_with(|config| config).await
}

/// Routes engine logs to the test harness when `RUST_LOG` is set.
pub fn init_logging() {
    let Ok(filter) = EnvFilter::try_from_default_env() else {
        return;
    };
    // Only the first call in a test binary installs the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub async fn file_db_with(configure: impl FnOnce(DbConfig) -> DbConfig) -> TestDb {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teller.db");
    let config = DbConfig::new(path.to_string_lossy())
        .max_connections(8)
        .min_connections(1);
    let db = Database::new(configure(config)).await.unwrap();
    TestDb { db, _dir: dir }
}

/// Opens an account with a balance in whole units.
pub async fn open(db: &Database, name: &str, major: i64) -> AccountId {
    let email = format!("{}@example.com", name.to_lowercase());
    let account = NewAccount::new(name, email, Amount::from_major(major)).unwrap();
    db.accounts().insert(&account).await.unwrap().id
}

pub async fn balance(db: &Database, id: AccountId) -> Amount {
    db.accounts().get_by_id(id).await.unwrap().unwrap().balance
}

// =============================================================================
// Fault Injection
// =============================================================================

/// What the wrapped repository should break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Every credit (`delta > 0`) fails after the debit went through.
    FailCredit,
    /// The next `n` lock calls report a store conflict. A conflicting lock
    /// ends its attempt, so this fails `n` attempts.
    ConflictOnLock(u32),
}

/// Wraps the SQLite repository, recording lock order and injecting faults.
#[derive(Debug, Clone)]
pub struct FaultyRepository {
    inner: SqliteAccountRepository,
    fault: Fault,
    conflicts_left: Arc<AtomicU32>,
    locks: Arc<Mutex<Vec<AccountId>>>,
}

impl FaultyRepository {
    pub fn new(db: &Database, fault: Fault) -> Self {
        let conflicts = match fault {
            Fault::ConflictOnLock(n) => n,
            _ => 0,
        };
        FaultyRepository {
            inner: db.accounts(),
            fault,
            conflicts_left: Arc::new(AtomicU32::new(conflicts)),
            locks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every id passed to `lock_for_update`, in call order.
    pub fn locks(&self) -> Vec<AccountId> {
        self.locks.lock().unwrap().clone()
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AccountRepository for FaultyRepository {
    type Tx = SqliteTransaction;

    async fn lock_for_update(&self, tx: &mut SqliteTransaction, id: AccountId) -> DbResult<Account> {
        self.locks.lock().unwrap().push(id);

        if self.take_conflict() {
            return Err(DbError::Conflict("injected serialization failure".to_string()));
        }

        self.inner.lock_for_update(tx, id).await
    }

    async fn adjust_balance(
        &self,
        tx: &mut SqliteTransaction,
        id: AccountId,
        delta: Amount,
    ) -> DbResult<()> {
        if self.fault == Fault::FailCredit && delta.is_positive() {
            return Err(DbError::QueryFailed("injected credit failure".to_string()));
        }
        self.inner.adjust_balance(tx, id, delta).await
    }

    async fn insert(&self, account: &NewAccount) -> DbResult<Account> {
        self.inner.insert(account).await
    }

    async fn get_by_id(&self, id: AccountId) -> DbResult<Option<Account>> {
        self.inner.get_by_id(id).await
    }

    async fn list_all(&self) -> DbResult<Vec<Account>> {
        self.inner.list_all().await
    }

    async fn total_balance(&self) -> DbResult<Amount> {
        self.inner.total_balance().await
    }
}
