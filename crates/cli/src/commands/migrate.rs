//! Database migration command.
//!
//! Applies the migrations embedded from `crates/server/migrations/`.
//! Already-applied migrations are skipped, so the command is safe to re-run.

use mercado_server::MIGRATOR;

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails or
/// a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    tracing::info!(available = MIGRATOR.iter().count(), "Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
