//! Error types for the migration runner
//!
//! Every variant aborts the current run. An empty up body is not represented
//! here: the runner logs it and moves on.

use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Migration directory or file could not be accessed
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The ledger references a migration file that is not on disk
    #[error("Migration file {0} not found in the migrations directory")]
    NotFound(String),

    /// Revert requested for a migration without a `-- down` section
    #[error("Migration {0} does not define a -- down section")]
    MissingDownSection(String),

    /// Duplicate ledger insert, usually a concurrent run applying the same file
    #[error("Migration {0} is already recorded in the ledger")]
    ConstraintViolation(String),

    /// The up or down body itself failed
    #[error("Migration {migration} failed: {message}")]
    SqlExecution { migration: String, message: String },

    /// Connection, ledger query or commit failure
    #[error("Database error: {0}")]
    Database(String),

    /// `create` would overwrite an existing migration file
    #[error("Migration file {0} already exists")]
    FileExists(String),

    /// Ledger table name is not a plain SQL identifier
    #[error("Invalid ledger table name: {0}")]
    InvalidTableName(String),
}

impl MigrationError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Attribute a statement failure to the migration whose body was running.
    ///
    /// Ledger-level errors (constraint violations and the like) pass through unchanged.
    pub fn in_migration(self, migration: &str) -> Self {
        match self {
            MigrationError::Database(message) => MigrationError::SqlExecution {
                migration: migration.to_string(),
                message,
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}
