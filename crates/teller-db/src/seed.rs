//! Demo accounts for development and the CLI `seed` command.

use tracing::{debug, info};

use teller_core::{Account, Amount, NewAccount};

use crate::error::{DbError, DbResult};
use crate::repository::AccountRepository;

/// (name, email, opening balance in minor units)
pub const DEMO_ACCOUNTS: &[(&str, &str, i64)] = &[
    ("Айман", "aizhan@example.com", 10_000),
    ("Ермек", "ermek@example.com", 5_000),
    ("Бекзат", "bekzat@example.com", 2_500),
];

/// What a seed run did.
#[derive(Debug, Default)]
pub struct SeedReport {
    pub inserted: Vec<Account>,
    /// Emails that already existed.
    pub skipped: Vec<String>,
}

/// Inserts the demo accounts, skipping any whose email is already taken.
///
/// Safe to run repeatedly.
pub async fn seed_demo_accounts<R: AccountRepository>(accounts: &R) -> DbResult<SeedReport> {
    let mut report = SeedReport::default();

    for (name, email, balance) in DEMO_ACCOUNTS {
        let account = NewAccount::new(name, email, Amount::from_minor(*balance))
            .map_err(|e| DbError::Internal(e.to_string()))?;

        match accounts.insert(&account).await {
            Ok(inserted) => {
                debug!(id = %inserted.id, email = %inserted.email, "Seeded account");
                report.inserted.push(inserted);
            }
            Err(DbError::UniqueViolation { .. }) => {
                debug!(email, "Account already present");
                report.skipped.push(email.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        inserted = report.inserted.len(),
        skipped = report.skipped.len(),
        "Seed complete"
    );
    Ok(report)
}
