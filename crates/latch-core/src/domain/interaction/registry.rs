//! Per-user staging of pending interactions

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::PendingInteraction;
use crate::domain::lock::UserId;

/// At most one pending interaction per user
#[derive(Debug, Default)]
pub struct InteractionRegistry {
    pending: DashMap<UserId, PendingInteraction>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an interaction, returning the one it replaced
    pub fn set(&self, user: UserId, interaction: PendingInteraction) -> Option<PendingInteraction> {
        self.pending.insert(user, interaction)
    }

    pub fn get(&self, user: UserId) -> Option<PendingInteraction> {
        self.pending.get(&user).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.pending.contains_key(&user)
    }

    pub fn clear(&self, user: UserId) -> Option<PendingInteraction> {
        self.pending.remove(&user).map(|(_, interaction)| interaction)
    }

    /// Fetch the interaction to apply for a targeting event.
    ///
    /// One-shot interactions are removed in the same step, so two
    /// concurrent targeting events cannot both consume them.
    pub fn take_for_target(&self, user: UserId) -> Option<PendingInteraction> {
        match self.pending.entry(user) {
            Entry::Occupied(entry) if entry.get().should_persist() => Some(entry.get().clone()),
            Entry::Occupied(entry) => Some(entry.remove()),
            Entry::Vacant(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
