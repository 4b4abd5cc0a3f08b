use std::process::ExitCode;

use anyhow::Context;
use serde::Serialize;

use teller_core::{Account, AccountId, Amount, NewAccount};
use teller_db::seed::seed_demo_accounts;
use teller_db::{AccountRepository, DbError, Store};

use super::print_json;

#[derive(Debug, Serialize)]
struct AccountList<'a> {
    accounts: &'a [Account],
    total: Amount,
}

pub async fn seed<S: Store>(store: &S) -> anyhow::Result<ExitCode> {
    let accounts = store.accounts();
    let report = seed_demo_accounts(&accounts)
        .await
        .context("Failed to seed demo accounts")?;

    for account in &report.inserted {
        println!("+ {}", describe(account));
    }
    for email in &report.skipped {
        println!("= {email} already exists");
    }
    println!();

    print_table(&accounts.list_all().await?, accounts.total_balance().await?);
    Ok(ExitCode::SUCCESS)
}

pub async fn list<S: Store>(store: &S, json: bool) -> anyhow::Result<ExitCode> {
    let repo = store.accounts();
    let accounts = repo.list_all().await?;
    let total = repo.total_balance().await?;

    if json {
        print_json(&AccountList {
            accounts: &accounts,
            total,
        })?;
    } else {
        print_table(&accounts, total);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn show<S: Store>(store: &S, id: AccountId, json: bool) -> anyhow::Result<ExitCode> {
    let Some(account) = store.accounts().get_by_id(id).await? else {
        eprintln!("Account {id} not found");
        return Ok(ExitCode::FAILURE);
    };

    if json {
        print_json(&account)?;
    } else {
        println!("{}", describe(&account));
        println!("  opened  {}", account.created_at.to_rfc3339());
        println!("  updated {}", account.updated_at.to_rfc3339());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn open<S: Store>(
    store: &S,
    name: String,
    email: String,
    balance: Amount,
) -> anyhow::Result<ExitCode> {
    let new_account = match NewAccount::new(name, email, balance) {
        Ok(account) => account,
        Err(err) => {
            eprintln!("✗ {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    match store.accounts().insert(&new_account).await {
        Ok(account) => {
            println!("✓ Opened {}", describe(&account));
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ DbError::UniqueViolation { .. }) => {
            eprintln!("✗ {err}");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).context("Failed to open account"),
    }
}

fn describe(account: &Account) -> String {
    format!(
        "{} {} <{}> {}",
        account.id, account.name, account.email, account.balance
    )
}

fn print_table(accounts: &[Account], total: Amount) {
    println!("{:>6}  {:<24} {:<32} {:>14}", "ID", "NAME", "EMAIL", "BALANCE");
    for account in accounts {
        println!(
            "{:>6}  {:<24} {:<32} {:>14}",
            account.id.to_string(),
            account.name,
            account.email,
            account.balance.to_string()
        );
    }
    println!("{:>6}  {:<24} {:<32} {:>14}", "", "", "TOTAL", total.to_string());
}
