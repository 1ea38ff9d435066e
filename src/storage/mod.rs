//! Database pool, user registry, file catalog and settings

pub mod db;
pub mod files;
pub mod settings;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
