//! Migration Rollback - Reverts the most recently applied migration
//!
//! Only the latest ledger entry can be reverted, one per invocation. Its down body and
//! the ledger delete share a transaction.

use std::time::Instant;

use super::definitions::RollbackResult;
use super::runner::MigrationRunner;
use crate::backends::HistoryStore;
use crate::error::{MigrationError, MigrationResult};

impl<H: HistoryStore> MigrationRunner<H> {
    /// Revert the latest applied migration.
    ///
    /// An empty ledger is a no-op. A missing file, or a file whose `-- down` section
    /// is absent or empty, fails before anything is changed.
    pub async fn run_down(&mut self) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();

        self.history_mut().ensure_table().await?;

        let Some(latest) = self.history_mut().latest().await? else {
            tracing::info!("No migrations to roll back");
            return Ok(RollbackResult {
                rolled_back: None,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        };

        if !self.manager().exists(&latest.name) {
            return Err(MigrationError::NotFound(latest.name));
        }

        let migration = self.manager().load(&latest.name)?;
        let Some(down_body) = migration.down_body.as_deref().filter(|b| !b.is_empty()) else {
            return Err(MigrationError::MissingDownSection(migration.name));
        };

        tracing::info!("Rolling back migration {}", migration.name);
        self.revert_migration(&migration.name, down_body).await?;

        let execution_time_ms = start_time.elapsed().as_millis();
        tracing::info!("Rolled back {} in {}ms", migration.name, execution_time_ms);

        Ok(RollbackResult {
            rolled_back: Some(migration.name),
            execution_time_ms,
        })
    }

    /// Run the down body and the ledger delete in one transaction
    async fn revert_migration(&mut self, name: &str, down_body: &str) -> MigrationResult<()> {
        let mut transaction = self.history_mut().begin().await?;

        let outcome = match transaction.execute(down_body).await {
            Ok(()) => transaction.remove(name).await,
            Err(e) => Err(e.in_migration(name)),
        };

        match outcome {
            Ok(()) => transaction.commit().await,
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::error!("Rollback of {} failed: {}", name, rollback_err);
                }
                Err(err)
            }
        }
    }
}
