//! Latch Core Library
//!
//! Resource locking and access control:
//! - Locks binding resource locations to an owner and an access policy
//! - Two-phase interactions (stage a create/change/delete/unlock, then target)
//! - Per-bucket lock limits and per-owner name uniqueness
//! - Argon2id password material
//! - Lock stores in memory and in SQLite
//! - Configuration loading

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use error::{Error, ErrorCategory, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{LatchConfig, LoadedConfig};
    pub use crate::domain::{
        ChangeLock, CreateLock, DeleteLock, Interaction, InteractionOutcome, Location, Lock,
        LockManager, LockRepository, LockSettings, LockType, PendingInteraction, Target,
        UnlockAttempt, UserId,
    };
    pub use crate::error::{Error, Result};
}

#[cfg(test)]
mod error_tests;
