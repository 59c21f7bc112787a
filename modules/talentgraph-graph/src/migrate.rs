use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Apply every pending migration under the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    info!("Migrations complete");
    Ok(())
}
