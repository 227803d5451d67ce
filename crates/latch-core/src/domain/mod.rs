//! Lock domain
//!
//! - `credentials`: password salting, hashing, and verification
//! - `lock`: the lock record and its stores
//! - `limits`: per-bucket lock limits
//! - `naming`: generated lock names
//! - `interaction`: staged interactions and their apply step
//! - `manager`: the [`LockManager`] facade
//! - `protection`: break, placement, and interference checks
//! - `guard`: keyed async mutexes

pub mod credentials;
pub mod guard;
pub mod interaction;
pub mod limits;
pub mod lock;
pub mod manager;
pub mod naming;
pub mod protection;

pub use credentials::{CredentialCodec, HashingParams, PasswordMaterial, Secret};
pub use interaction::{
    AccessGrant, ChangeLock, CreateLock, DeleteLock, Interaction, InteractionOutcome,
    PendingInteraction, ResourceSnapshot, Target, UnlockAttempt,
};
pub use limits::{LimitTable, TOTAL_BUCKET};
pub use lock::{
    DeleteOutcome, DeleteScope, InMemoryLockRepository, Location, Lock, LockId, LockRepository,
    LockType, SqliteLockRepository, UserId,
};
pub use manager::{LockManager, LockSettings};
pub use protection::BreakOutcome;
