//! # Seed Data Generator
//!
//! Inserts the demo accounts for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./teller_dev.db (default)
//! cargo run -p teller-db --bin seed
//!
//! # Specify database path
//! cargo run -p teller-db --bin seed -- --db ./data/teller.db
//! ```
//!
//! ## Accounts
//! | Name   | Email              | Balance |
//! |--------|--------------------|---------|
//! | Айман  | aizhan@example.com | 100.00  |
//! | Ермек  | ermek@example.com  | 50.00   |
//! | Бекзат | bekzat@example.com | 25.00   |
//!
//! Existing emails are skipped, so running it twice is harmless.

use std::env;

use teller_db::seed::seed_demo_accounts;
use teller_db::{AccountRepository, Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./teller_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Teller Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./teller_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Teller Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let accounts = db.accounts();
    let report = seed_demo_accounts(&accounts).await?;

    for account in &report.inserted {
        println!("  + {} {} <{}> {}", account.id, account.name, account.email, account.balance);
    }
    for email in &report.skipped {
        println!("  = {} already exists", email);
    }

    println!();
    println!("Total balance: {}", accounts.total_balance().await?);
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
