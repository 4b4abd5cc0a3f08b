//! # Account Repository (SQLite)
//!
//! ## Locking Without Row Locks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SQLite has one writer at a time and no SELECT ... FOR UPDATE.         │
//! │                                                                         │
//! │  lock_for_update issues a no-op write as the first statement:          │
//! │                                                                         │
//! │    UPDATE accounts SET balance = balance WHERE id = ? RETURNING ...    │
//! │                                                                         │
//! │  The write takes the database write lock, which covers every row, so   │
//! │  it is at least as strong as a row lock. The lock is held until        │
//! │  commit/rollback. Waiting for it is bounded by busy_timeout; when it   │
//! │  runs out SQLite answers SQLITE_BUSY (DbError::LockTimeout).           │
//! │                                                                         │
//! │  Because the write comes first, the transaction never holds a stale    │
//! │  read snapshot, so SQLITE_BUSY_SNAPSHOT cannot occur here.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use teller_core::{Account, AccountId, Amount, NewAccount};

use super::{AccountRepository, AccountRow};
use crate::error::{DbError, DbResult};
use crate::transaction::SqliteTransaction;

/// Repository for account database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.accounts();
///
/// let aizhan = repo.insert(&NewAccount::new("Айман", "aizhan@example.com", Amount::from_major(100))?).await?;
/// let all = repo.list_all().await?;
/// ```
#[derive(Debug, Clone)]
pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    /// Creates a new SqliteAccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteAccountRepository { pool }
    }

    /// Number of accounts.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    type Tx = SqliteTransaction;

    async fn lock_for_update(&self, tx: &mut SqliteTransaction, id: AccountId) -> DbResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            UPDATE accounts
            SET balance = balance
            WHERE id = ?1
            RETURNING id, name, email, balance, created_at, updated_at
            "#,
        )
        .bind(id.get())
        .fetch_optional(tx.connection())
        .await?;

        match row {
            Some(row) => {
                debug!(account = %id, "Acquired write lock");
                Ok(row.into())
            }
            None => Err(DbError::not_found("Account", id)),
        }
    }

    async fn adjust_balance(
        &self,
        tx: &mut SqliteTransaction,
        id: AccountId,
        delta: Amount,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + ?1,
                updated_at = ?2
            WHERE id = ?3
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

        debug!(account = %id, delta = %delta, "Balance adjusted");
        Ok(())
    }

    async fn insert(&self, account: &NewAccount) -> DbResult<Account> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (name, email, balance, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING id, name, email, balance, created_at, updated_at
            "#,
        )
        .bind(account.name())
        .bind(account.email())
        .bind(account.balance().minor())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("email", account.email()),
            other => other,
        })?;

        debug!(account = row.id, email = %row.email, "Account inserted");
        Ok(row.into())
    }

    async fn get_by_id(&self, id: AccountId) -> DbResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, balance, created_at, updated_at
            FROM accounts
            WHERE id = ?1
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
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(Amount::from_minor(total))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::transaction::{IsolationLevel, TransactionHandle, TransactionSource};
    use tokio::time::Instant;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn new_account(name: &str, email: &str, major: i64) -> NewAccount {
        NewAccount::new(name, email, Amount::from_major(major)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = db.accounts();

        let inserted = repo
            .insert(&new_account("Айман", "aizhan@example.com", 100))
            .await
            .unwrap();
        assert_eq!(inserted.balance, Amount::from_minor(10_000));

        let fetched = repo.get_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert_eq!(repo.get_by_id(AccountId::new(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let db = setup().await;
        let repo = db.accounts();

        repo.insert(&new_account("Ермек", "ermek@example.com", 50))
            .await
            .unwrap();
        let err = repo
            .insert(&new_account("Ермек 2", "ermek@example.com", 10))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "email"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_all_and_total() {
        let db = setup().await;
        let repo = db.accounts();

        assert_eq!(repo.total_balance().await.unwrap(), Amount::zero());

        let b = repo.insert(&new_account("B", "b@example.com", 50)).await.unwrap();
        let a = repo.insert(&new_account("A", "a@example.com", 100)).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.iter().map(|acc| acc.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(repo.total_balance().await.unwrap(), Amount::from_major(150));
    }

    #[tokio::test]
    async fn test_lock_and_adjust_in_transaction() {
        let db = setup().await;
        let repo = db.accounts();
        let account = repo.insert(&new_account("A", "a@example.com", 100)).await.unwrap();

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let mut tx = db
            .begin_transaction(IsolationLevel::ReadCommitted, deadline)
            .await
            .unwrap();

        let locked = repo.lock_for_update(&mut tx, account.id).await.unwrap();
        assert_eq!(locked.balance, Amount::from_major(100));

        repo.adjust_balance(&mut tx, account.id, -Amount::from_major(15))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let after = repo.get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(after.balance, Amount::from_major(85));
        assert!(after.updated_at >= account.updated_at);
    }

    #[tokio::test]
    async fn test_rollback_discards_adjustment() {
        let db = setup().await;
        let repo = db.accounts();
        let account = repo.insert(&new_account("A", "a@example.com", 100)).await.unwrap();

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let mut tx = db
            .begin_transaction(IsolationLevel::ReadCommitted, deadline)
            .await
            .unwrap();
        repo.lock_for_update(&mut tx, account.id).await.unwrap();
        repo.adjust_balance(&mut tx, account.id, -Amount::from_major(40))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let after = repo.get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(after.balance, Amount::from_major(100));
    }

    #[tokio::test]
    async fn test_lock_missing_account() {
        let db = setup().await;
        let repo = db.accounts();

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let mut tx = db
            .begin_transaction(IsolationLevel::ReadCommitted, deadline)
            .await
            .unwrap();
        let err = repo.lock_for_update(&mut tx, AccountId::new(999)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = repo
            .adjust_balance(&mut tx, AccountId::new(999), Amount::from_minor(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_constraint_backstop() {
        let db = setup().await;
        let repo = db.accounts();
        let account = repo.insert(&new_account("A", "a@example.com", 1)).await.unwrap();

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let mut tx = db
            .begin_transaction(IsolationLevel::ReadCommitted, deadline)
            .await
            .unwrap();
        repo.lock_for_update(&mut tx, account.id).await.unwrap();
        let err = repo
            .adjust_balance(&mut tx, account.id, -Amount::from_major(2))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CheckViolation(_)));
        tx.rollback().await.unwrap();
    }
}
