//! # Commands
//!
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (argument types, dispatch, output)
//! ├── store.rs     ◄─── init, ping
//! ├── accounts.rs  ◄─── seed, accounts, account, open
//! └── transfer.rs  ◄─── transfer, stress
//! ```
//!
//! Every command is generic over [`Store`], so SQLite and PostgreSQL share
//! one implementation.

mod accounts;
mod store;
mod transfer;

use std::process::ExitCode;

use clap::Subcommand;
use serde::Serialize;

use teller_core::{AccountId, Amount};
use teller_db::Store;

use crate::config::TellerConfig;

/// Upper bound on `stress --rounds`; every round spawns two tasks.
pub const MAX_STRESS_ROUNDS: i64 = 100_000;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database and apply migrations
    Init,

    /// Insert the demo accounts (existing emails are skipped)
    Seed,

    /// List all accounts and the total balance
    Accounts {
        #[arg(long)]
        json: bool,
    },

    /// Show one account
    Account {
        id: AccountId,
        #[arg(long)]
        json: bool,
    },

    /// Open a new account
    Open {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Opening balance in major units, e.g. 100 or 12.50
        #[arg(long, default_value = "0", value_parser = Amount::parse_major)]
        balance: Amount,
    },

    /// Move money from one account to another
    Transfer {
        from: AccountId,
        to: AccountId,
        /// Amount in major units, e.g. 15, 15.5 or 15.50
        #[arg(value_parser = Amount::parse_major, allow_hyphen_values = true)]
        amount: Amount,
        #[arg(long)]
        json: bool,
    },

    /// Run opposing transfers concurrently and check the pair's total
    Stress {
        #[arg(long)]
        from: AccountId,
        #[arg(long)]
        to: AccountId,
        /// Transfers in each direction
        #[arg(
            long,
            default_value_t = 50,
            value_parser = clap::value_parser!(u32).range(1..=MAX_STRESS_ROUNDS)
        )]
        rounds: u32,
        #[arg(long, default_value = "1", value_parser = Amount::parse_major)]
        amount: Amount,
    },

    /// Check connectivity
    Ping,
}

pub async fn execute<S: Store>(
    store: &S,
    command: Command,
    config: &TellerConfig,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Init => store::init(store).await,
        Command::Ping => store::ping(store).await,
        Command::Seed => accounts::seed(store).await,
        Command::Accounts { json } => accounts::list(store, json).await,
        Command::Account { id, json } => accounts::show(store, id, json).await,
        Command::Open {
            name,
            email,
            balance,
        } => accounts::open(store, name, email, balance).await,
        Command::Transfer {
            from,
            to,
            amount,
            json,
        } => transfer::transfer(store, config, from, to, amount, json).await,
        Command::Stress {
            from,
            to,
            rounds,
            amount,
        } => transfer::stress(store, config, from, to, rounds, amount).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
