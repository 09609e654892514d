//! Migration System
//!
//! File handling (`manager`, `naming`), the apply path (`runner`) and the revert path
//! (`rollback`).

pub mod definitions;
pub mod manager;
pub mod naming;
pub mod rollback;
pub mod runner;

pub use definitions::*;
pub use manager::{parse_migration_content, MigrationManager, MIGRATION_TEMPLATE};
pub use naming::{migration_file_name, slugify};
pub use runner::MigrationRunner;
