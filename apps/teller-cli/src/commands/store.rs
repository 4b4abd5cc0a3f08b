use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use tracing::info;

use teller_db::Store;

/// Migrations already ran while connecting; report where the schema stands.
pub async fn init<S: Store>(store: &S) -> anyhow::Result<ExitCode> {
    let (total, applied) = store
        .migration_status()
        .await
        .context("Failed to read migration status")?;

    info!(total, applied, "Schema ready");
    println!("✓ Database ready ({applied}/{total} migrations applied)");
    Ok(ExitCode::SUCCESS)
}

/// Round-trips one query; connecting is bounded by the acquire timeout.
pub async fn ping<S: Store>(store: &S) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    match store.ping().await {
        Ok(()) => {
            println!("✓ Connected ({} ms)", started.elapsed().as_millis());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("✗ Ping failed: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
