//! Lock entity and related types
//!
//! Defines the `Lock` record, its access policy (`LockType`), and the
//! `Location` coordinates a lock protects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::domain::credentials::PasswordMaterial;
use crate::error::{Error, Result};

/// Identifier of a lock record
pub type LockId = Uuid;

/// Identifier of a user (lock owner, accessor, or requester)
pub type UserId = Uuid;

/// Access policy of a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// Only the owner and listed accessors
    OwnerOnly,
    /// Password required on every access
    PasswordAlways,
    /// Password required once, then standing access is granted
    PasswordOnce,
    /// Owner plus an explicit shared-access list
    SharedList,
    /// Anyone may look, only the owner and accessors may take
    Display,
}

impl LockType {
    pub const ALL: [LockType; 5] = [
        Self::OwnerOnly,
        Self::PasswordAlways,
        Self::PasswordOnce,
        Self::SharedList,
        Self::Display,
    ];

    /// Create from string representation (case-insensitive, `-` or `_`)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "owner_only" | "private" => Some(Self::OwnerOnly),
            "password_always" => Some(Self::PasswordAlways),
            "password_once" => Some(Self::PasswordOnce),
            "shared_list" | "shared" => Some(Self::SharedList),
            "display" => Some(Self::Display),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OwnerOnly => "owner_only",
            Self::PasswordAlways => "password_always",
            Self::PasswordOnce => "password_once",
            Self::SharedList => "shared_list",
            Self::Display => "display",
        }
    }

    /// Whether this type carries password material
    pub fn is_password(&self) -> bool {
        matches!(self, Self::PasswordAlways | Self::PasswordOnce)
    }
}

impl Default for LockType {
    fn default() -> Self {
        Self::OwnerOnly
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A block coordinate in a named world
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The location directly below this one
    pub fn below(&self) -> Self {
        Self::new(self.world.clone(), self.x, self.y - 1, self.z)
    }

    /// The location directly above this one
    pub fn above(&self) -> Self {
        Self::new(self.world.clone(), self.x, self.y + 1, self.z)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// A persisted access-control record protecting one or more locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Unique identifier, fixed at creation
    pub id: LockId,

    /// Current owner
    pub owner: UserId,

    /// Name, unique per owner ignoring case
    pub name: String,

    /// Access policy
    pub lock_type: LockType,

    /// Protected locations; more than one only for paired resources
    pub locations: Vec<Location>,

    /// Users granted access independent of password or ownership
    pub accessors: BTreeSet<UserId>,

    /// Hash and salt, present only for password types
    pub password: Option<PasswordMaterial>,

    /// Whether interference signals are suppressed at this lock's locations
    pub protect_from_redstone: bool,

    /// Kind of resource being protected (e.g. "minecraft:chest")
    pub locked_object: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lock {
    /// Create a new lock with no accessors and no password material
    pub fn new(
        owner: UserId,
        name: impl Into<String>,
        lock_type: LockType,
        locations: Vec<Location>,
        locked_object: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            name: name.into(),
            lock_type,
            locations,
            accessors: BTreeSet::new(),
            password: None,
            protect_from_redstone: false,
            locked_object: locked_object.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Lowercased name used for per-owner uniqueness
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Owner or explicitly listed accessor
    pub fn can_access(&self, user: UserId) -> bool {
        self.is_owner(user) || self.accessors.contains(&user)
    }

    pub fn contains_location(&self, location: &Location) -> bool {
        self.locations.contains(location)
    }

    /// Whether this lock spans a paired resource
    pub fn is_paired(&self) -> bool {
        self.locations.len() > 1
    }

    /// Grant standing access; the owner is never listed. Returns whether the set changed.
    pub fn add_accessor(&mut self, user: UserId) -> bool {
        if self.is_owner(user) {
            return false;
        }
        self.accessors.insert(user)
    }

    /// Revoke standing access. Returns whether the set changed.
    pub fn remove_accessor(&mut self, user: UserId) -> bool {
        self.accessors.remove(&user)
    }

    /// Revoke all standing access. Returns whether the set changed.
    pub fn clear_accessors(&mut self) -> bool {
        let changed = !self.accessors.is_empty();
        self.accessors.clear();
        changed
    }

    /// Transfer ownership; the new owner drops out of the accessor list
    pub fn set_owner(&mut self, owner: UserId) {
        self.accessors.remove(&owner);
        self.owner = owner;
    }

    /// Change the access policy, discarding password material when leaving a password type
    pub fn set_type(&mut self, lock_type: LockType) {
        self.lock_type = lock_type;
        if !lock_type.is_password() {
            self.password = None;
        }
    }

    /// Record a change to the lock
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Short, human-readable form of the locked object kind ("minecraft:chest" -> "chest")
    pub fn object_label(&self) -> &str {
        object_label(&self.locked_object)
    }

    /// Check the record-level invariants a store must never persist a violation of
    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            return Err(Error::InvalidInput("a lock needs at least one location".to_string()));
        }
        let distinct: BTreeSet<&Location> = self.locations.iter().collect();
        if distinct.len() != self.locations.len() {
            return Err(Error::InvalidInput("duplicate lock location".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("lock name cannot be empty".to_string()));
        }
        if self.accessors.contains(&self.owner) {
            return Err(Error::InvalidInput("owner cannot be an accessor".to_string()));
        }
        if self.lock_type.is_password() != self.password.is_some() {
            return Err(Error::PasswordRequired(self.lock_type.to_string()));
        }
        Ok(())
    }
}

/// Strip a namespace prefix from a resource kind
pub fn object_label(kind: &str) -> &str {
    kind.rsplit(':').next().unwrap_or(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chest(owner: UserId) -> Lock {
        Lock::new(
            owner,
            "Chest1",
            LockType::OwnerOnly,
            vec![Location::new("world", 10, 64, 10)],
            "minecraft:chest",
        )
    }

    #[test]
    fn test_lock_type_round_trip_names() {
        for lock_type in LockType::ALL {
            assert_eq!(LockType::from_str(lock_type.as_str()), Some(lock_type));
        }
        assert_eq!(LockType::from_str("OWNER_ONLY"), Some(LockType::OwnerOnly));
        assert_eq!(LockType::from_str("password-once"), Some(LockType::PasswordOnce));
        assert_eq!(LockType::from_str("bogus"), None);
    }

    #[test]
    fn test_password_types() {
        assert!(LockType::PasswordAlways.is_password());
        assert!(LockType::PasswordOnce.is_password());
        assert!(!LockType::OwnerOnly.is_password());
        assert!(!LockType::SharedList.is_password());
        assert!(!LockType::Display.is_password());
    }

    #[test]
    fn test_owner_is_never_an_accessor() {
        let owner = Uuid::new_v4();
        let mut lock = chest(owner);
        assert!(!lock.add_accessor(owner));
        assert!(lock.accessors.is_empty());

        let other = Uuid::new_v4();
        assert!(lock.add_accessor(other));
        assert!(!lock.add_accessor(other));
        lock.set_owner(other);
        assert!(!lock.accessors.contains(&other));
        assert!(lock.validate().is_ok());
    }

    #[test]
    fn test_set_type_clears_password_material() {
        let mut lock = chest(Uuid::new_v4());
        lock.lock_type = LockType::PasswordAlways;
        lock.password = Some(PasswordMaterial {
            hash: "h".to_string(),
            salt: "s".to_string(),
        });
        assert!(lock.validate().is_ok());

        lock.set_type(LockType::SharedList);
        assert!(lock.password.is_none());
        assert!(lock.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_password_type_without_material() {
        let mut lock = chest(Uuid::new_v4());
        lock.lock_type = LockType::PasswordOnce;
        assert_eq!(lock.validate().unwrap_err().code(), "E401");
    }

    #[test]
    fn test_validate_rejects_duplicate_locations() {
        let mut lock = chest(Uuid::new_v4());
        lock.locations.push(Location::new("world", 10, 64, 10));
        assert!(lock.validate().is_err());
    }

    #[test]
    fn test_location_neighbours_and_display() {
        let loc = Location::new("nether", 1, 70, -3);
        assert_eq!(loc.below().y, 69);
        assert_eq!(loc.above().y, 71);
        assert_eq!(loc.to_string(), "nether(1, 70, -3)");
    }

    #[test]
    fn test_object_label() {
        assert_eq!(object_label("minecraft:trapped_chest"), "trapped_chest");
        assert_eq!(object_label("barrel"), "barrel");
        assert_eq!(chest(Uuid::new_v4()).object_label(), "chest");
    }
}
