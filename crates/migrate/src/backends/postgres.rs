//! PostgreSQL ledger implementation
//!
//! Uses a single sqlx connection for the whole invocation. Migration bodies are sent
//! through the simple query protocol so a body may hold several statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, Executor, PgConnection, Postgres, Row, Transaction};
use std::collections::HashSet;

use super::core::{HistoryStore, LedgerTransaction};
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::{HistoryRecord, MigrationConfig};

/// Ledger stored in a PostgreSQL table
pub struct PgHistoryStore {
    conn: PgConnection,
    table: String,
}

impl PgHistoryStore {
    /// Wrap an open connection. The table name must already be validated.
    pub fn new(conn: PgConnection, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }

    /// Open the single connection used by one invocation
    pub async fn connect(database_url: &str, config: &MigrationConfig) -> MigrationResult<Self> {
        config.validate()?;

        let conn = PgConnection::connect(database_url)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self::new(conn, config.migrations_table.clone()))
    }
}

/// SQL to create the migrations tracking table
fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            id BIGSERIAL PRIMARY KEY,\n    \
            name TEXT NOT NULL UNIQUE,\n    \
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\n\
        )",
        table
    )
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn ensure_table(&mut self) -> MigrationResult<()> {
        let sql = create_table_sql(&self.table);
        sqlx::query(&sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn applied_names(&mut self) -> MigrationResult<HashSet<String>> {
        let sql = format!("SELECT name FROM {} ORDER BY applied_at ASC, id ASC", self.table);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to query applied migrations: {}", e)))?;

        let mut names = HashSet::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get("name")
                .map_err(|e| MigrationError::Database(format!("Failed to get migration name: {}", e)))?;
            names.insert(name);
        }

        tracing::debug!("{} migration(s) recorded in {}", names.len(), self.table);
        Ok(names)
    }

    async fn latest(&mut self) -> MigrationResult<Option<HistoryRecord>> {
        let sql = format!(
            "SELECT id, name, applied_at FROM {} ORDER BY applied_at DESC, id DESC LIMIT 1",
            self.table
        );
        let row = sqlx::query(&sql)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to query latest migration: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row
            .try_get("id")
            .map_err(|e| MigrationError::Database(format!("Failed to get migration id: {}", e)))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| MigrationError::Database(format!("Failed to get migration name: {}", e)))?;
        let applied_at: DateTime<Utc> = row
            .try_get("applied_at")
            .map_err(|e| MigrationError::Database(format!("Failed to get applied_at: {}", e)))?;

        Ok(Some(HistoryRecord { id, name, applied_at }))
    }

    async fn begin<'a>(&'a mut self) -> MigrationResult<Box<dyn LedgerTransaction + 'a>> {
        let Self { conn, table } = self;
        let tx = conn
            .begin()
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to start transaction: {}", e)))?;

        Ok(Box::new(PgLedgerTransaction { tx, table: table.as_str() }))
    }

    async fn close(self) -> MigrationResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to close connection: {}", e)))
    }
}

/// Transaction over the store's connection
pub struct PgLedgerTransaction<'a> {
    tx: Transaction<'a, Postgres>,
    table: &'a str,
}

#[async_trait]
impl<'a> LedgerTransaction for PgLedgerTransaction<'a> {
    async fn execute(&mut self, sql: &str) -> MigrationResult<()> {
        (&mut *self.tx)
            .execute(sql)
            .await
            .map_err(|e| MigrationError::Database(e.to_string()))?;
        Ok(())
    }

    async fn record(&mut self, name: &str) -> MigrationResult<()> {
        let sql = format!("INSERT INTO {} (name) VALUES ($1)", self.table);
        sqlx::query(&sql)
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    MigrationError::ConstraintViolation(name.to_string())
                }
                _ => MigrationError::Database(format!("Failed to record migration: {}", e)),
            })?;
        Ok(())
    }

    async fn remove(&mut self, name: &str) -> MigrationResult<()> {
        let sql = format!("DELETE FROM {} WHERE name = $1", self.table);
        sqlx::query(&sql)
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to remove migration record: {}", e)))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MigrationResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to commit migration: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> MigrationResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to rollback migration: {}", e)))
    }
}
