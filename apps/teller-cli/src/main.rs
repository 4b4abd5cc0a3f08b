//! # teller
//!
//! Command-line front end for the Teller transfer engine.
//!
//! ## Startup Sequence
//! 1. Parse arguments
//! 2. Load configuration (defaults → teller.toml → environment → flags)
//! 3. Initialize tracing (logging)
//! 4. Connect the store selected by the database URL
//! 5. Run the command, close the pool, exit with its code
//!
//! ## Examples
//! ```bash
//! teller init
//! teller seed
//! teller transfer 1 2 15.00
//! teller --database postgres://teller@localhost/teller accounts --json
//! ```

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use teller_db::{Backend, Database, Store};

use commands::Command;
use config::{LogFormat, LoggingSettings, TellerConfig};

#[derive(Debug, Parser)]
#[command(name = "teller", version, about = "Atomic account-to-account transfers")]
struct Cli {
    /// Config file (default: platform config dir/teller.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database path or URL; overrides config and DATABASE_URL
    #[arg(long, global = true, value_name = "URL_OR_PATH")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = TellerConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database.url = database;
    }

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting teller");

    let mut db_config = config.db_config();
    if matches!(cli.command, Command::Ping) {
        db_config = db_config.run_migrations(false);
    }

    match db_config.backend() {
        Backend::Sqlite => {
            let db = Database::new(db_config)
                .await
                .context("Failed to open SQLite database")?;
            execute(db, cli.command, &config).await
        }
        Backend::Postgres => run_postgres(db_config, cli.command, &config).await,
    }
}

async fn execute<S: Store>(
    store: S,
    command: Command,
    config: &TellerConfig,
) -> anyhow::Result<ExitCode> {
    let result = commands::execute(&store, command, config).await;
    store.close().await;
    result
}

#[cfg(feature = "postgres")]
async fn run_postgres(
    db_config: teller_db::DbConfig,
    command: Command,
    config: &TellerConfig,
) -> anyhow::Result<ExitCode> {
    let db = teller_db::PgDatabase::new(db_config)
        .await
        .context("Failed to connect to PostgreSQL")?;
    execute(db, command, config).await
}

#[cfg(not(feature = "postgres"))]
async fn run_postgres(
    _db_config: teller_db::DbConfig,
    _command: Command,
    _config: &TellerConfig,
) -> anyhow::Result<ExitCode> {
    anyhow::bail!("PostgreSQL support is not compiled in; rebuild with `--features postgres`")
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG` - takes precedence over everything
/// - `logging.filter` / `TELLER_LOG` - default `info,teller=debug,sqlx=warn`
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(settings: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match settings.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_core::{AccountId, Amount};

    #[test]
    fn test_parse_transfer() {
        let cli = Cli::try_parse_from(["teller", "transfer", "#1", "2", "15.5"]).unwrap();
        match cli.command {
            Command::Transfer {
                from,
                to,
                amount,
                json,
            } => {
                assert_eq!(from, AccountId::new(1));
                assert_eq!(to, AccountId::new(2));
                assert_eq!(amount, Amount::from_minor(1550));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_negative_amount_reaches_the_engine() {
        let cli = Cli::try_parse_from(["teller", "transfer", "1", "2", "-5"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Transfer { amount, .. } if amount == Amount::from_major(-5)
        ));
    }

    #[test]
    fn test_malformed_amount_is_a_usage_error() {
        assert!(Cli::try_parse_from(["teller", "transfer", "1", "2", "15.505"]).is_err());
        assert!(Cli::try_parse_from(["teller", "transfer", "one", "2", "1"]).is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["teller", "accounts", "--json", "--database", "x.db"]).unwrap();
        assert_eq!(cli.database.as_deref(), Some("x.db"));
        assert!(matches!(cli.command, Command::Accounts { json: true }));
    }

    #[test]
    fn test_stress_defaults() {
        let cli = Cli::try_parse_from(["teller", "stress", "--from", "1", "--to", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Stress { rounds: 50, amount, .. } if amount == Amount::from_major(1)
        ));
    }

    #[rstest::rstest]
    #[case("0")]
    #[case("100001")]
    #[case("4294967295")]
    fn test_stress_rounds_are_bounded(#[case] rounds: &str) {
        let parsed =
            Cli::try_parse_from(["teller", "stress", "--from", "1", "--to", "2", "--rounds", rounds]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_stress_rounds_upper_bound_is_accepted() {
        let cli = Cli::try_parse_from([
            "teller", "stress", "--from", "1", "--to", "2", "--rounds", "100000",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Stress { rounds: 100_000, .. }));
    }
}
