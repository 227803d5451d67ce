//! Interaction variants, targets, and outcomes
//!
//! An interaction is staged during the command phase and applied when the
//! user next targets a resource. Each variant carries only its own
//! configuration; unset optional fields mean "leave as is".

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::credentials::Secret;
use crate::domain::lock::{Location, Lock, LockType, UserId};

/// What the host knows about a targeted resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource kind identifier, e.g. "minecraft:chest"
    pub kind: String,

    /// The other half of a double-wide resource, resolved by the host
    pub partner: Option<Location>,
}

/// A targeting event: the location a user acted on and what is there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub location: Location,
    pub snapshot: ResourceSnapshot,
}

impl Target {
    pub fn new(location: Location, kind: impl Into<String>) -> Self {
        Self {
            location,
            snapshot: ResourceSnapshot {
                kind: kind.into(),
                partner: None,
            },
        }
    }

    /// Attach the partner location of a paired resource
    pub fn with_partner(mut self, partner: Location) -> Self {
        self.snapshot.partner = Some(partner);
        self
    }

    pub fn kind(&self) -> &str {
        &self.snapshot.kind
    }
}

/// Lock the targeted resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateLock {
    /// Defaults to [`LockType::OwnerOnly`]
    pub lock_type: Option<LockType>,
    /// Generated when absent
    pub name: Option<String>,
    /// Required for password types, rejected otherwise
    pub password: Option<Secret>,
    /// Defaults to the configured `protect_from_redstone`
    pub protect_from_redstone: Option<bool>,
}

impl CreateLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, lock_type: LockType) -> Self {
        self.lock_type = Some(lock_type);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<Secret>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_redstone_protection(mut self, protect: bool) -> Self {
        self.protect_from_redstone = Some(protect);
        self
    }
}

/// Edit the targeted lock; only set fields are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLock {
    pub lock_type: Option<LockType>,
    pub password: Option<Secret>,
    pub name: Option<String>,
    pub new_owner: Option<UserId>,
    pub members_to_add: Vec<UserId>,
    pub members_to_remove: Vec<UserId>,
    pub protect_from_redstone: Option<bool>,
}

impl ChangeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, lock_type: LockType) -> Self {
        self.lock_type = Some(lock_type);
        self
    }

    pub fn with_password(mut self, password: impl Into<Secret>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_new_owner(mut self, owner: UserId) -> Self {
        self.new_owner = Some(owner);
        self
    }

    pub fn add_members(mut self, members: impl IntoIterator<Item = UserId>) -> Self {
        self.members_to_add.extend(members);
        self
    }

    pub fn remove_members(mut self, members: impl IntoIterator<Item = UserId>) -> Self {
        self.members_to_remove.extend(members);
        self
    }

    pub fn with_redstone_protection(mut self, protect: bool) -> Self {
        self.protect_from_redstone = Some(protect);
        self
    }

    /// Whether a type or owner change requires a limit re-check
    pub fn affects_limits(&self) -> bool {
        self.lock_type.is_some() || self.new_owner.is_some()
    }
}

/// Remove the targeted lock and every location it protects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteLock;

/// Access check against the targeted lock, optionally with a password
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockAttempt {
    pub password: Option<Secret>,
}

impl UnlockAttempt {
    pub fn with_password(password: impl Into<Secret>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

/// A staged lock interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Create(CreateLock),
    Change(ChangeLock),
    Delete(DeleteLock),
    Unlock(UnlockAttempt),
}

impl Interaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Change(_) => "change",
            Self::Delete(_) => "delete",
            Self::Unlock(_) => "unlock",
        }
    }
}

impl Default for Interaction {
    /// A plain access check, used when nothing is staged
    fn default() -> Self {
        Self::Unlock(UnlockAttempt::default())
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An interaction waiting for its targeting event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInteraction {
    interaction: Interaction,
    persist: bool,
}

impl PendingInteraction {
    /// A one-shot interaction, cleared once applied
    pub fn new(interaction: Interaction) -> Self {
        Self {
            interaction,
            persist: false,
        }
    }

    /// An interaction that stays staged after being applied
    pub fn persisting(interaction: Interaction) -> Self {
        Self {
            interaction,
            persist: true,
        }
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn into_interaction(self) -> Interaction {
        self.interaction
    }

    pub fn should_persist(&self) -> bool {
        self.persist
    }

    pub fn set_persistence(&mut self, persist: bool) {
        self.persist = persist;
    }
}

impl From<Interaction> for PendingInteraction {
    fn from(interaction: Interaction) -> Self {
        Self::new(interaction)
    }
}

/// Why an access check passed.
///
/// Every grant lets the user open the resource, but only those for which
/// [`AccessGrant::permits_use`] holds let them take or change its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessGrant {
    Owner,
    Accessor,
    Bypass,
    /// Correct password; asked again next time
    Password,
    /// Correct password; standing access granted
    PasswordRemembered,
    /// Display lock opened by a non-member. The host must show the contents
    /// read-only: no taking, placing, or moving items.
    ViewOnly,
}

impl AccessGrant {
    /// Whether the user may use the resource, not just look into it
    pub fn permits_use(&self) -> bool {
        !matches!(self, Self::ViewOnly)
    }
}

/// Result of applying an interaction to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    Created(Lock),
    Changed {
        lock: Lock,
        /// False when nothing actually changed and no write happened
        persisted: bool,
    },
    Deleted(Lock),
    /// Access passed; check `grant` before allowing anything beyond viewing
    Unlocked {
        lock: Lock,
        grant: AccessGrant,
    },
}

impl InteractionOutcome {
    /// The lock the interaction acted on, as it stands afterwards
    /// (or stood, for a deletion)
    pub fn lock(&self) -> &Lock {
        match self {
            Self::Created(lock) | Self::Deleted(lock) => lock,
            Self::Changed { lock, .. } | Self::Unlocked { lock, .. } => lock,
        }
    }

    /// Message for the user who triggered the interaction
    pub fn message(&self) -> String {
        match self {
            Self::Created(lock) => format!(
                "You have created a {} lock, {}.",
                lock.lock_type.as_str().replace('_', " "),
                lock.name
            ),
            Self::Changed { .. } => "Lock data has been successfully updated.".to_string(),
            Self::Deleted(lock) => format!("You have deleted this {} lock.", lock.object_label()),
            Self::Unlocked { lock, grant } => match grant {
                AccessGrant::PasswordRemembered => format!(
                    "You have unlocked this {} and will not need the password again.",
                    lock.object_label()
                ),
                AccessGrant::ViewOnly => format!("This {} is on display.", lock.object_label()),
                _ => format!("You have unlocked this {}.", lock.object_label()),
            },
        }
    }
}
