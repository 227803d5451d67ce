//! World protection checks built on the lock store
//!
//! These cover the events around a lock rather than the lock interactions
//! themselves: interference signals reaching locked resources, breaking a
//! locked resource or the block it stands on, and placing restricted
//! resources next to someone else's lock.

use tracing::{debug, info};

use super::interaction::Target;
use super::lock::{DeleteOutcome, Location, Lock, UserId};
use super::manager::LockManager;
use crate::error::{Error, Result};

/// What breaking a resource did to the lock protecting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakOutcome {
    /// Nothing locked was affected
    Unprotected,
    /// The broken location was detached; the lock still covers the rest
    LocationRemoved(Lock),
    /// The broken location was the lock's last one
    LockRemoved(Lock),
}

impl LockManager {
    /// Locations among `neighbors` that an interference signal must not reach
    pub async fn suppressed_neighbors(&self, neighbors: &[Location]) -> Result<Vec<Location>> {
        let mut suppressed = Vec::new();
        for location in neighbors {
            if let Some(lock) = self.get_lock(location).await? {
                if lock.protect_from_redstone {
                    suppressed.push(location.clone());
                }
            }
        }
        if !suppressed.is_empty() {
            debug!(count = suppressed.len(), "Suppressing interference at locked locations");
        }
        Ok(suppressed)
    }

    /// Decide what happens when `user` breaks `target`.
    ///
    /// `above` is what sits directly on top of the target, if anything.
    /// Locks whose kind is protect-below also guard the block beneath them.
    /// The owner (or a bypassing user) breaking a locked location detaches
    /// that location only; anyone else is refused.
    pub async fn check_break(
        &self,
        user: UserId,
        target: &Target,
        above: Option<&Target>,
    ) -> Result<BreakOutcome> {
        if let Some(above) = above {
            if above.location == target.location.above() && self.is_protect_below(above.kind()) {
                if let Some(lock) = self.get_lock(&above.location).await? {
                    if !self.may_administer(&lock, user) {
                        return Err(Error::NotOwner);
                    }
                }
            }
        }

        let Some(lock) = self.get_lock(&target.location).await? else {
            return Ok(BreakOutcome::Unprotected);
        };
        if !self.may_administer(&lock, user) {
            return Err(Error::NotOwner);
        }

        let outcome = match self.delete_lock(&target.location, false).await? {
            DeleteOutcome::LockRemoved => BreakOutcome::LockRemoved(lock),
            DeleteOutcome::LocationRemoved => BreakOutcome::LocationRemoved(lock),
            DeleteOutcome::Missing => BreakOutcome::Unprotected,
        };
        if !matches!(outcome, BreakOutcome::Unprotected) {
            info!(user = %user, location = %target.location, "Locked resource broken");
        }
        Ok(outcome)
    }

    /// Refuse placing a restricted kind next to a lock `user` cannot access
    pub async fn check_placement(&self, user: UserId, kind: &str, neighbors: &[Location]) -> Result<()> {
        if !self.is_restricted(kind) || self.is_bypassing(user) {
            return Ok(());
        }
        for location in neighbors {
            if let Some(lock) = self.get_lock(location).await? {
                if !lock.can_access(user) {
                    debug!(user = %user, lock_id = %lock.id, kind, "Restricted placement refused");
                    return Err(Error::AccessDenied);
                }
            }
        }
        Ok(())
    }
}
