//! Locks and their persistence
//!
//! - `entity`: the [`Lock`] record, [`LockType`], and [`Location`]
//! - `repository_trait`: the storage contract
//! - `memory`: process-memory store
//! - `repository`: SQLite store

pub mod entity;
pub mod memory;
pub mod repository;
pub mod repository_trait;

pub use entity::{Location, Lock, LockId, LockType, UserId, object_label};
pub use memory::InMemoryLockRepository;
pub use repository::SqliteLockRepository;
pub use repository_trait::{DeleteOutcome, DeleteScope, LockRepository};
