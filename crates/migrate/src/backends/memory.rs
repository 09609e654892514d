//! In-memory ledger used by the runner tests
//!
//! Executed bodies are appended to a shared statement log standing in for the schema.
//! A body containing [`FAILING_STATEMENT`] fails like a SQL error would. Several stores
//! may share one state to play concurrent invocations against the same database, and
//! [`MemoryHistoryStore::commit_concurrently`] lets another invocation win the ledger
//! insert for a given name just before this one records it.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::core::{HistoryStore, LedgerTransaction};
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::HistoryRecord;

/// Bodies containing this text fail on execution
pub const FAILING_STATEMENT: &str = "RAISE_ERROR";

#[derive(Debug, Default)]
pub struct MemoryState {
    pub table_created: bool,
    pub statements: Vec<String>,
    pub records: Vec<HistoryRecord>,
    pub closed: bool,
    next_id: i64,
    concurrent_commit: Option<String>,
}

impl MemoryState {
    fn push_record(&mut self, name: String) {
        self.next_id += 1;
        let id = self.next_id;
        self.records.push(HistoryRecord {
            id,
            name,
            applied_at: Utc::now(),
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second connection to the same database
    pub fn share(&self) -> Self {
        self.clone()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn recorded_names(&self) -> Vec<String> {
        self.state().records.iter().map(|r| r.name.clone()).collect()
    }

    /// Have another connection commit `name` right before the next `record(name)`
    pub fn commit_concurrently(&self, name: &str) {
        self.state().concurrent_commit = Some(name.to_string());
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn ensure_table(&mut self) -> MigrationResult<()> {
        self.state().table_created = true;
        Ok(())
    }

    async fn applied_names(&mut self) -> MigrationResult<HashSet<String>> {
        Ok(self.recorded_names().into_iter().collect())
    }

    async fn latest(&mut self) -> MigrationResult<Option<HistoryRecord>> {
        Ok(self
            .state()
            .records
            .iter()
            .max_by_key(|r| (r.applied_at, r.id))
            .cloned())
    }

    async fn begin<'a>(&'a mut self) -> MigrationResult<Box<dyn LedgerTransaction + 'a>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
        }))
    }

    async fn close(self) -> MigrationResult<()> {
        self.state().closed = true;
        Ok(())
    }
}

#[derive(Debug)]
enum PendingOp {
    Execute(String),
    Record(String),
    Remove(String),
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    pending: Vec<PendingOp>,
}

impl MemoryTransaction {
    fn is_recorded(&self, name: &str) -> bool {
        let committed = self.state.lock().unwrap().records.iter().any(|r| r.name == name);
        let mut recorded = committed;
        for op in &self.pending {
            match op {
                PendingOp::Record(n) if n == name => recorded = true,
                PendingOp::Remove(n) if n == name => recorded = false,
                _ => {}
            }
        }
        recorded
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str) -> MigrationResult<()> {
        if sql.contains(FAILING_STATEMENT) {
            return Err(MigrationError::Database(format!(
                "syntax error at or near \"{}\"",
                FAILING_STATEMENT
            )));
        }
        self.pending.push(PendingOp::Execute(sql.to_string()));
        Ok(())
    }

    async fn record(&mut self, name: &str) -> MigrationResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.concurrent_commit.as_deref() == Some(name) {
                state.concurrent_commit = None;
                state.push_record(name.to_string());
            }
        }

        if self.is_recorded(name) {
            return Err(MigrationError::ConstraintViolation(name.to_string()));
        }
        self.pending.push(PendingOp::Record(name.to_string()));
        Ok(())
    }

    async fn remove(&mut self, name: &str) -> MigrationResult<()> {
        self.pending.push(PendingOp::Remove(name.to_string()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MigrationResult<()> {
        let this = *self;
        let mut state = this.state.lock().unwrap();
        for op in this.pending {
            match op {
                PendingOp::Execute(sql) => state.statements.push(sql),
                PendingOp::Record(name) => state.push_record(name),
                PendingOp::Remove(name) => state.records.retain(|r| r.name != name),
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrationResult<()> {
        Ok(())
    }
}
