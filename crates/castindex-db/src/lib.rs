//! Castindex DB - Relational metadata store (shows and episodes) using SQLite.

mod database;
mod error;
mod migrations;
mod operations;

pub use database::Database;
pub use error::{DbError, DbResult};
pub use operations::import::MetadataImport;
pub use operations::stats::MetadataStats;
