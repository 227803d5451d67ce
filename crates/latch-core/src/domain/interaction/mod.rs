//! Two-phase lock interactions
//!
//! A user first stages an interaction (create, change, delete, unlock) and
//! then targets a resource; the staged interaction is applied to whatever
//! they targeted. See [`LockManager::handle_target`](crate::domain::LockManager::handle_target).

pub mod handler;
pub mod registry;
pub mod types;

pub use registry::InteractionRegistry;
pub use types::{
    AccessGrant, ChangeLock, CreateLock, DeleteLock, Interaction, InteractionOutcome,
    PendingInteraction, ResourceSnapshot, Target, UnlockAttempt,
};
