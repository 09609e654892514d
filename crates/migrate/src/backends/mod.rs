//! Ledger storage backends
//!
//! `core` defines the traits the runner depends on; `postgres` is the production
//! implementation.

pub mod core;
pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use self::core::{HistoryStore, LedgerTransaction};
pub use postgres::{PgHistoryStore, PgLedgerTransaction};
