//! Storage layer - SQLite
//!
//! Provides the connection pool and schema migrations backing
//! [`SqliteLockRepository`](crate::domain::lock::SqliteLockRepository).
//!
//! # Usage
//!
//! ```ignore
//! use latch_core::storage::Database;
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//!
//! // Or open the configured file
//! let db = Database::new(DatabaseConfig::with_path(path)).await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
