//! Migration Runner - Executes migrations against the database
//!
//! Applies pending migration files in file name order. Each file runs in its own
//! transaction together with its ledger insert, so a failure leaves neither the schema
//! change nor the ledger entry behind.

use std::path::PathBuf;
use std::time::Instant;

use super::definitions::{MigrationConfig, MigrationFile, MigrationRunResult};
use super::manager::MigrationManager;
use crate::backends::{HistoryStore, PgHistoryStore};
use crate::error::MigrationResult;

/// Migration runner that executes migrations against a ledger-backed database
pub struct MigrationRunner<H> {
    manager: MigrationManager,
    history: H,
}

impl MigrationRunner<PgHistoryStore> {
    /// Connect to PostgreSQL and build a runner over that single connection
    pub async fn connect(database_url: &str, config: MigrationConfig) -> MigrationResult<Self> {
        let history = PgHistoryStore::connect(database_url, &config).await?;
        Ok(Self::new(MigrationManager::with_config(config), history))
    }
}

impl<H: HistoryStore> MigrationRunner<H> {
    /// Create a new migration runner
    pub fn new(manager: MigrationManager, history: H) -> Self {
        Self { manager, history }
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    pub(crate) fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    /// Create a new migration file; does not touch the database
    pub fn create_migration(&self, raw_name: Option<&str>) -> MigrationResult<PathBuf> {
        self.manager.create_migration(raw_name)
    }

    /// Apply every pending migration, stopping at the first failure.
    ///
    /// Files with an empty up body are skipped and stay pending.
    pub async fn run_up(&mut self) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.history.ensure_table().await?;

        let files = self.manager.list_migrations()?;
        let applied = self.history.applied_names().await?;

        let mut result = MigrationRunResult {
            already_applied_count: files.iter().filter(|f| applied.contains(*f)).count(),
            ..Default::default()
        };

        for name in files.iter().filter(|f| !applied.contains(*f)) {
            let migration = self.manager.load(name)?;

            if migration.has_empty_up() {
                tracing::warn!("Skipping {}: no -- up body", migration.name);
                result.skipped_empty.push(migration.name);
                continue;
            }

            tracing::info!("Applying migration {}", migration.name);
            self.apply_migration(&migration).await?;
            result.applied_migrations.push(migration.name);
        }

        result.execution_time_ms = start_time.elapsed().as_millis();

        if result.applied_migrations.is_empty() {
            tracing::info!("Migrations are up to date");
        } else {
            tracing::info!(
                "Applied {} migration(s) in {}ms",
                result.applied_count(),
                result.execution_time_ms
            );
        }

        Ok(result)
    }

    /// Run the up body and the ledger insert in one transaction
    async fn apply_migration(&mut self, migration: &MigrationFile) -> MigrationResult<()> {
        let mut transaction = self.history.begin().await?;

        let outcome = match transaction.execute(&migration.up_body).await {
            Ok(()) => transaction.record(&migration.name).await,
            Err(e) => Err(e.in_migration(&migration.name)),
        };

        match outcome {
            Ok(()) => transaction.commit().await,
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::error!("Rollback of {} failed: {}", migration.name, rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Release the database connection
    pub async fn close(self) -> MigrationResult<()> {
        self.history.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryHistoryStore, FAILING_STATEMENT};
    use crate::error::MigrationError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn runner_in(dir: &Path, store: &MemoryHistoryStore) -> MigrationRunner<MemoryHistoryStore> {
        let manager = MigrationManager::with_config(MigrationConfig::new(dir, "test_migrations"));
        MigrationRunner::new(manager, store.share())
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_run_up_applies_in_file_name_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        write(temp_dir.path(), "20240102000000__b.sql", "-- up\nCREATE TABLE b (id INT);\n-- down\nDROP TABLE b;");
        write(temp_dir.path(), "20240101000000__a.sql", "-- up\nCREATE TABLE a (id INT);\n-- down\nDROP TABLE a;");

        let mut runner = runner_in(temp_dir.path(), &store);
        let result = runner.run_up().await.unwrap();

        assert_eq!(result.applied_migrations, vec!["20240101000000__a.sql", "20240102000000__b.sql"]);
        assert_eq!(result.already_applied_count, 0);
        assert!(store.state().table_created);
        assert_eq!(store.statements(), vec!["CREATE TABLE a (id INT);", "CREATE TABLE b (id INT);"]);
        assert_eq!(store.recorded_names(), vec!["20240101000000__a.sql", "20240102000000__b.sql"]);
    }

    #[tokio::test]
    async fn test_run_up_twice_applies_each_file_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        write(temp_dir.path(), "20240101000000__a.sql", "-- up\nCREATE TABLE a (id INT);");
        write(temp_dir.path(), "20240102000000__b.sql", "-- up\nCREATE TABLE b (id INT);");

        let mut runner = runner_in(temp_dir.path(), &store);
        runner.run_up().await.unwrap();
        let second = runner.run_up().await.unwrap();

        assert!(second.applied_migrations.is_empty());
        assert_eq!(second.already_applied_count, 2);
        assert_eq!(store.statements().len(), 2);
        assert_eq!(store.recorded_names().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_up_body_is_never_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        write(temp_dir.path(), "20240101000000__draft.sql", "-- up\n   \n\t\n-- down\nDROP TABLE x;");
        write(temp_dir.path(), "20240102000000__real.sql", "-- up\nCREATE TABLE real (id INT);");

        let mut runner = runner_in(temp_dir.path(), &store);
        for _ in 0..3 {
            let result = runner.run_up().await.unwrap();
            assert_eq!(result.skipped_empty, vec!["20240101000000__draft.sql"]);
        }

        assert_eq!(store.recorded_names(), vec!["20240102000000__real.sql"]);
        assert_eq!(store.statements(), vec!["CREATE TABLE real (id INT);"]);
    }

    #[tokio::test]
    async fn test_filled_in_draft_is_applied_later() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        let mut runner = runner_in(temp_dir.path(), &store);

        let path = runner.create_migration(Some("later")).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        runner.run_up().await.unwrap();
        assert!(store.recorded_names().is_empty());

        fs::write(&path, "-- up\nCREATE TABLE later (id INT);\n-- down\nDROP TABLE later;\n").unwrap();
        let result = runner.run_up().await.unwrap();
        assert_eq!(result.applied_migrations, vec![name]);
    }

    #[tokio::test]
    async fn test_failed_up_leaves_no_trace_and_halts() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        write(temp_dir.path(), "20240101000000__a.sql", "-- up\nCREATE TABLE a (id INT);");
        write(
            temp_dir.path(),
            "20240102000000__broken.sql",
            &format!("-- up\nCREATE TABLE b (id INT);\n{};", FAILING_STATEMENT),
        );
        write(temp_dir.path(), "20240103000000__c.sql", "-- up\nCREATE TABLE c (id INT);");

        let mut runner = runner_in(temp_dir.path(), &store);
        let err = runner.run_up().await.unwrap_err();

        match err {
            MigrationError::SqlExecution { migration, .. } => {
                assert_eq!(migration, "20240102000000__broken.sql")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.recorded_names(), vec!["20240101000000__a.sql"]);
        assert_eq!(store.statements(), vec!["CREATE TABLE a (id INT);"]);

        // Fixing the body makes it eligible again
        write(temp_dir.path(), "20240102000000__broken.sql", "-- up\nCREATE TABLE b (id INT);");
        let result = runner.run_up().await.unwrap();
        assert_eq!(
            result.applied_migrations,
            vec!["20240102000000__broken.sql", "20240103000000__c.sql"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_apply_loser_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        let mut other = store.share();

        // The other invocation has executed the body but not yet recorded it
        let mut transaction = other.begin().await.unwrap();
        transaction.execute("CREATE TABLE a (id INT);").await.unwrap();

        write(temp_dir.path(), "20240101000000__a.sql", "-- up\nCREATE TABLE a (id INT);");
        let mut runner = runner_in(temp_dir.path(), &store);
        runner.run_up().await.unwrap();

        let err = transaction.record("20240101000000__a.sql").await.unwrap_err();
        assert!(matches!(err, MigrationError::ConstraintViolation(_)));
        transaction.rollback().await.unwrap();

        assert_eq!(store.statements(), vec!["CREATE TABLE a (id INT);"]);
        assert_eq!(store.recorded_names(), vec!["20240101000000__a.sql"]);
    }

    #[tokio::test]
    async fn test_losing_a_concurrent_apply_halts_the_run() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();
        write(temp_dir.path(), "20240101000000__a.sql", "-- up\nCREATE TABLE a (id INT);");
        write(temp_dir.path(), "20240102000000__b.sql", "-- up\nCREATE TABLE b (id INT);");
        write(temp_dir.path(), "20240103000000__c.sql", "-- up\nCREATE TABLE c (id INT);");

        // Another invocation records b after this run has read the ledger
        store.commit_concurrently("20240102000000__b.sql");

        let mut runner = runner_in(temp_dir.path(), &store);
        let err = runner.run_up().await.unwrap_err();

        assert!(matches!(err, MigrationError::ConstraintViolation(name) if name == "20240102000000__b.sql"));
        assert_eq!(store.statements(), vec!["CREATE TABLE a (id INT);"]);
        assert_eq!(
            store.recorded_names(),
            vec!["20240101000000__a.sql", "20240102000000__b.sql"]
        );

        // The next run sees b as applied and carries on with c
        let result = runner.run_up().await.unwrap();
        assert_eq!(result.applied_migrations, vec!["20240103000000__c.sql"]);
        assert_eq!(result.already_applied_count, 2);
    }

    #[tokio::test]
    async fn test_run_up_with_no_files_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("db/migrations");
        let store = MemoryHistoryStore::new();

        let mut runner = runner_in(&dir, &store);
        let result = runner.run_up().await.unwrap();

        assert_eq!(result.applied_count(), 0);
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_close_releases_connection() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryHistoryStore::new();

        let runner = runner_in(temp_dir.path(), &store);
        runner.close().await.unwrap();
        assert!(store.state().closed);
    }
}
