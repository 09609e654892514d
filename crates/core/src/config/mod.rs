pub mod database;
pub mod sources;

pub use database::*;
pub use sources::*;
