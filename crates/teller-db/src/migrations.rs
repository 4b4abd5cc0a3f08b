//! # Database Migrations
//!
//! Schema for the SQLite backend, embedded at compile time from
//! `migrations/sqlite`. The PostgreSQL backend embeds `migrations/postgres`
//! the same way and shares [`count_applied`].
//!
//! ```text
//! Database::new (run_migrations = true) / teller init
//!     └─► run_migrations ─► MIGRATOR.run ─► _sqlx_migrations row per file
//!
//! teller ping
//!     └─► migration_status ─► (embedded, applied)
//!             no _sqlx_migrations table ─► (n, 0)
//! ```
//!
//! New schema changes go in a new numbered file in both directories.
//! Applied files are never edited.

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies whatever is pending and reports how many ran.
///
/// Checksums of already applied migrations are verified by sqlx on every
/// run, so an edited migration fails here instead of being skipped.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<usize> {
    let (total, before) = migration_status(pool).await?;
    MIGRATOR.run(pool).await?;

    let ran = total - before;
    if ran == 0 {
        debug!(total, "Schema up to date");
    } else {
        info!(ran, total, "Applied migrations");
    }
    Ok(ran)
}

/// Returns (total, applied) for the embedded migrations.
///
/// A database that was never migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let tracked: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    if !tracked {
        return Ok((MIGRATOR.migrations.len(), 0));
    }

    let versions: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success")
            .fetch_all(pool)
            .await?;

    Ok(count_applied(&MIGRATOR, &versions))
}

/// Counts embedded migrations whose version is among `applied`; rows left
/// by migrations this build doesn't know about are ignored.
pub(crate) fn count_applied(migrator: &Migrator, applied: &[i64]) -> (usize, usize) {
    let total = migrator.migrations.len();
    let done = migrator
        .migrations
        .iter()
        .filter(|migration| applied.contains(&migration.version))
        .count();
    (total, done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_status_before_and_after_migrating() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert!(total >= 1);
        assert_eq!(applied, 0);

        assert_eq!(run_migrations(db.pool()).await.unwrap(), total);
        assert_eq!(migration_status(db.pool()).await.unwrap(), (total, total));

        // Second run has nothing to do.
        assert_eq!(run_migrations(db.pool()).await.unwrap(), 0);
    }

    #[test]
    fn test_count_ignores_unknown_versions() {
        let first = MIGRATOR.migrations[0].version;
        let (total, applied) = count_applied(&MIGRATOR, &[first, 99_999_999]);
        assert_eq!(total, MIGRATOR.migrations.len());
        assert_eq!(applied, 1);
    }
}
