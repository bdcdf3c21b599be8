use anyhow::{Context, Result, anyhow};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use tracing::info;

use advisory_backend::MIGRATIONS;

/// Apply pending migrations on a dedicated connection
pub fn run_pending_migrations(database_url: &str) -> Result<usize> {
    let mut conn = PgConnection::establish(database_url)
        .context("Failed to connect to the database for migrations")?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;

    for version in &applied {
        info!(%version, "Applied migration");
    }
    Ok(applied.len())
}

pub async fn handle_migrate(database_url: String) -> Result<()> {
    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "migrate");
    });

    let applied = tokio::task::spawn_blocking(move || run_pending_migrations(&database_url))
        .await
        .context("Migration task panicked")??;

    if applied == 0 {
        info!("Database schema is up to date");
    } else {
        info!(applied, "Database migrations completed");
    }
    Ok(())
}
