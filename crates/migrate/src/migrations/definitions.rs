//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! MigrationFile, HistoryRecord, and MigrationConfig structures.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::error::{MigrationError, MigrationResult};

/// Default location of migration files, relative to the working directory
pub const DEFAULT_MIGRATIONS_DIR: &str = "db/migrations";

/// Default ledger table name
pub const DEFAULT_MIGRATIONS_TABLE: &str = "kit_migrations";

/// A parsed migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name, including the `.sql` extension
    pub name: String,
    /// SQL applied by `up`, trimmed; may be empty
    pub up_body: String,
    /// SQL applied by `down`; `None` when the file has no `-- down` marker
    pub down_body: Option<String>,
}

impl MigrationFile {
    /// Whether the up body has nothing to execute
    pub fn has_empty_up(&self) -> bool {
        self.up_body.trim().is_empty()
    }
}

/// A row of the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Surrogate key, used to break `applied_at` ties
    pub id: i64,
    /// Migration file name
    pub name: String,
    /// When the migration was applied
    pub applied_at: DateTime<Utc>,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
}

impl MigrationConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>, migrations_table: impl Into<String>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            migrations_table: migrations_table.into(),
        }
    }

    /// Check that the ledger table name can be interpolated into SQL.
    ///
    /// Accepts `table` or `schema.table`, each part matching `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn validate(&self) -> MigrationResult<()> {
        let parts: Vec<&str> = self.migrations_table.split('.').collect();
        let valid = parts.len() <= 2 && parts.iter().all(|part| is_identifier(part));

        if valid {
            Ok(())
        } else {
            Err(MigrationError::InvalidTableName(self.migrations_table.clone()))
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATIONS_DIR, DEFAULT_MIGRATIONS_TABLE)
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Result of running migrations
#[derive(Debug, Default)]
pub struct MigrationRunResult {
    /// Names of migrations applied by this run, in apply order
    pub applied_migrations: Vec<String>,
    /// Names of pending migrations skipped because their up body is empty
    pub skipped_empty: Vec<String>,
    /// Number of migrations that were already applied before this run
    pub already_applied_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Result of rolling back the latest migration
#[derive(Debug, Default)]
pub struct RollbackResult {
    /// Name of the reverted migration; `None` when the ledger was empty
    pub rolled_back: Option<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}
