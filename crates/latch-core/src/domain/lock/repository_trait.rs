//! Repository trait for lock persistence
//!
//! This module defines the storage contract the lock core depends on. Every
//! mutation is atomic with respect to a single lock's full record: a later
//! read observes either the whole write or none of it.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

use super::entity::{Lock, LockId, LockType, Location, UserId};

/// How much of a lock a delete removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    /// Every location of the lock, and the lock itself
    Entire,
    /// A single location; the lock goes with its last location
    Location(Location),
}

/// What a delete actually removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The lock and all its locations are gone
    LockRemoved,
    /// One location was detached; the lock still protects the others
    LocationRemoved,
    /// Nothing matched
    Missing,
}

/// Repository trait for lock persistence
///
/// Implementations may be in-memory, file-based, or relational.
#[async_trait]
pub trait LockRepository: Send + Sync {
    // ========== Lookups ==========

    /// Get the lock protecting a location
    async fn find_by_location(&self, location: &Location) -> Result<Option<Lock>>;

    /// Get a lock by ID
    async fn find_by_id(&self, id: LockId) -> Result<Option<Lock>>;

    /// All locks owned by a user
    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Lock>>;

    /// Whether `owner` has no lock named `name` (ignoring case)
    async fn is_name_unique(&self, owner: UserId, name: &str) -> Result<bool>;

    /// Number of locks `owner` holds, per lock type
    async fn count_locks_by_type(&self, owner: UserId) -> Result<HashMap<LockType, u32>>;

    // ========== Mutations ==========

    /// Persist a new lock with all its locations and accessors.
    ///
    /// Fails with `AlreadyLocked` if any location is taken and `NameConflict`
    /// if the owner already uses the name.
    async fn create(&self, lock: &Lock) -> Result<()>;

    /// Remove a lock, or one of its locations
    async fn delete(&self, id: LockId, scope: DeleteScope) -> Result<DeleteOutcome>;

    /// Attach another location to an existing lock
    async fn add_location(&self, id: LockId, location: &Location) -> Result<()>;

    /// Grant standing access
    async fn grant_access(&self, id: LockId, user: UserId) -> Result<()>;

    /// Revoke standing access
    async fn revoke_access(&self, id: LockId, user: UserId) -> Result<()>;

    /// Revoke every accessor
    async fn revoke_all_access(&self, id: LockId) -> Result<()>;

    /// Replace the full record (owner, name, type, password, flags, accessors)
    async fn update_attributes(&self, lock: &Lock) -> Result<()>;
}
