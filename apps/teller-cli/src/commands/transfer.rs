use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use teller_core::{AccountId, Amount, TransferStep};
use teller_db::{
    AccountRepository, Store, TransferCoordinator, TransferError, TransferErrorKind,
    TransferOutcome,
};

use super::print_json;
use crate::config::TellerConfig;

fn coordinator<S: Store>(store: &S, config: &TellerConfig) -> TransferCoordinator<S, S::Accounts> {
    TransferCoordinator::from_store(store)
        .with_retry_policy(config.retry_policy())
        .with_attempt_timeout(config.attempt_timeout())
}

/// JSON shape of a failed transfer.
#[derive(Debug, Serialize)]
struct FailureReport {
    error: TransferErrorKind,
    step: Option<TransferStep>,
    outcome: TransferOutcome,
    message: String,
}

impl From<&TransferError> for FailureReport {
    fn from(err: &TransferError) -> Self {
        FailureReport {
            error: err.kind(),
            step: err.step(),
            outcome: err.outcome(),
            message: err.to_string(),
        }
    }
}

/// Exit code 0 on success, 1 on any transfer error.
pub async fn transfer<S: Store>(
    store: &S,
    config: &TellerConfig,
    from: AccountId,
    to: AccountId,
    amount: Amount,
    json: bool,
) -> anyhow::Result<ExitCode> {
    match coordinator(store, config).transfer(from, to, amount).await {
        Ok(receipt) if json => {
            print_json(&receipt)?;
            Ok(ExitCode::SUCCESS)
        }
        Ok(receipt) => {
            println!(
                "✓ Transferred {} from {} to {} (attempts: {})",
                receipt.amount, receipt.from, receipt.to, receipt.attempts
            );
            println!("  {} balance {}", receipt.from, receipt.from_balance);
            println!("  {} balance {}", receipt.to, receipt.to_balance);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if json => {
            print_json(&FailureReport::from(&err))?;
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            eprintln!("✗ {}: {}", err.kind(), err);
            if err.outcome() == TransferOutcome::Indeterminate {
                eprintln!("  The commit did not confirm; check both balances before retrying.");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Debug, Default)]
struct StressTally {
    committed: u32,
    failures: BTreeMap<&'static str, u32>,
}

/// Runs `rounds` transfers `from → to` and `rounds` transfers `to → from`
/// at once, then checks that the pair's combined balance did not move.
pub async fn stress<S: Store>(
    store: &S,
    config: &TellerConfig,
    from: AccountId,
    to: AccountId,
    rounds: u32,
    amount: Amount,
) -> anyhow::Result<ExitCode> {
    let transfers = rounds
        .checked_mul(2)
        .with_context(|| format!("{rounds} rounds is too many"))?;
    let repo = store.accounts();
    let before = pair_total(&repo, from, to).await?;
    let coordinator = coordinator(store, config);

    info!(%from, %to, rounds, %amount, "Starting stress run");
    let started = Instant::now();

    let mut handles = Vec::with_capacity(transfers as usize);
    for round in 0..transfers {
        let coordinator = coordinator.clone();
        let (sender, receiver) = if round % 2 == 0 { (from, to) } else { (to, from) };
        handles.push(tokio::spawn(async move {
            coordinator.transfer(sender, receiver, amount).await
        }));
    }

    let mut tally = StressTally::default();
    for handle in handles {
        match handle.await.context("Transfer task panicked")? {
            Ok(_) => tally.committed += 1,
            Err(err) => {
                *tally.failures.entry(err.kind().as_str()).or_default() += 1;
            }
        }
    }

    let elapsed = started.elapsed();
    let after = pair_total(&repo, from, to).await?;

    println!("Ran {transfers} transfers in {:.2}s", elapsed.as_secs_f64());
    println!("  committed  {}", tally.committed);
    for (kind, count) in &tally.failures {
        println!("  {kind:<10} {count}");
    }
    println!("  total before {before}, after {after}");

    if before == after {
        println!("✓ Combined balance unchanged");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(%before, %after, "Combined balance changed during stress run");
        eprintln!("✗ Combined balance changed: {before} → {after}");
        Ok(ExitCode::FAILURE)
    }
}

async fn pair_total<R: AccountRepository>(
    repo: &R,
    a: AccountId,
    b: AccountId,
) -> anyhow::Result<Amount> {
    let mut total = Amount::zero();
    for id in [a, b] {
        let account = repo
            .get_by_id(id)
            .await?
            .with_context(|| format!("Account {id} not found"))?;
        total += account.balance;
    }
    Ok(total)
}
