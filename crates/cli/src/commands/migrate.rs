use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kit_core::DatabaseConfig;
use kit_migrate::{MigrationConfig, MigrationManager, MigrationRunner, PgHistoryStore};

/// Where migrations live and which ledger table tracks them
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub migrations_dir: PathBuf,
    pub table: String,
}

impl MigrateOptions {
    fn migration_config(&self) -> MigrationConfig {
        MigrationConfig::new(&self.migrations_dir, &self.table)
    }
}

/// Write a new migration from the template. Needs no database.
pub fn create(options: &MigrateOptions, name: Option<&str>) -> Result<PathBuf> {
    let manager = MigrationManager::with_config(options.migration_config());
    let path = manager
        .create_migration(name)
        .with_context(|| format!("cannot create migration in {}", options.migrations_dir.display()))?;

    tracing::info!("Created migration {}", display_name(&path));
    Ok(path)
}

/// Apply all pending migrations
pub async fn up(options: &MigrateOptions) -> Result<()> {
    let mut runner = connect(options).await?;

    let outcome = runner.run_up().await;
    release(runner).await;
    outcome.context("migration run failed")?;

    Ok(())
}

/// Revert the most recently applied migration
pub async fn down(options: &MigrateOptions) -> Result<()> {
    let mut runner = connect(options).await?;

    let outcome = runner.run_down().await;
    release(runner).await;
    outcome.context("rollback failed")?;

    Ok(())
}

async fn connect(options: &MigrateOptions) -> Result<MigrationRunner<PgHistoryStore>> {
    let database = DatabaseConfig::from_env().context("cannot resolve database configuration")?;
    database.validate()?;

    tracing::debug!("Connecting to {} ({})", database.masked_url(), database.source);

    MigrationRunner::connect(&database.url, options.migration_config())
        .await
        .with_context(|| format!("cannot connect to {}", database.masked_url()))
}

/// Close the connection; the operation's own result takes precedence over a close failure
async fn release(runner: MigrationRunner<PgHistoryStore>) {
    if let Err(e) = runner.close().await {
        tracing::warn!("Failed to close database connection: {}", e);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
