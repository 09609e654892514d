//! Ledger storage traits
//!
//! The runner talks to the database only through these traits: a `HistoryStore`
//! owning the single connection of an invocation, and the `LedgerTransaction` it hands
//! out, in which a migration body and its ledger bookkeeping commit together.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::MigrationResult;
use crate::migrations::definitions::HistoryRecord;

/// Persistent record of applied migrations
#[async_trait]
pub trait HistoryStore: Send {
    /// Create the ledger table if it does not exist
    async fn ensure_table(&mut self) -> MigrationResult<()>;

    /// Names of every applied migration
    async fn applied_names(&mut self) -> MigrationResult<HashSet<String>>;

    /// The most recently applied migration, if any
    async fn latest(&mut self) -> MigrationResult<Option<HistoryRecord>>;

    /// Begin a transaction spanning a migration body and its ledger change
    async fn begin<'a>(&'a mut self) -> MigrationResult<Box<dyn LedgerTransaction + 'a>>;

    /// Release the underlying connection
    async fn close(self) -> MigrationResult<()>
    where
        Self: Sized;
}

/// A transaction against the schema and the ledger.
///
/// Dropping it without `commit` discards every change made through it.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Execute a migration body, which may contain several statements
    async fn execute(&mut self, sql: &str) -> MigrationResult<()>;

    /// Insert a ledger entry; a duplicate name fails with `ConstraintViolation`
    async fn record(&mut self, name: &str) -> MigrationResult<()>;

    /// Delete the ledger entry for `name`
    async fn remove(&mut self, name: &str) -> MigrationResult<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrationResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrationResult<()>;
}
