//! # kit-migrate: file-based SQL migrations for PostgreSQL
//!
//! Migrations are `.sql` files named `<timestamp>__<slug>.sql` holding an up body and
//! an optional `-- down` body. Applied migrations are tracked in a ledger table; each
//! body commits or rolls back together with its ledger change.
//!
//! The runner never reads the environment: callers resolve the connection string and
//! pass it in.

pub mod backends;
pub mod error;
pub mod migrations;

pub use backends::{HistoryStore, LedgerTransaction, PgHistoryStore};
pub use error::{MigrationError, MigrationResult};
pub use migrations::*;
