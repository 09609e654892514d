//! Runtime plumbing shared by the kit binaries: connection settings, logging setup
//! and the errors they raise.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{mask_database_url, ConfigSource, DatabaseConfig};
pub use errors::{CoreError, CoreResult};
pub use logging::{init_logging, LoggingConfig};
