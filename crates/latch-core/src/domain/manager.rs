//! Lock manager facade
//!
//! The lock manager is the entry point hosts talk to. It owns:
//! - the lock store, behind [`LockRepository`]
//! - the pending-interaction registry
//! - the bypass set
//! - the settings snapshot (resource classes, limits, defaults)
//!
//! Mutations that must be checked-then-committed run under keyed async
//! mutexes: one per lock record, one per owner for limit checks. Unrelated
//! locks and owners never contend.

use dashmap::DashSet;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::credentials::{CredentialCodec, PasswordMaterial, Secret};
use super::guard::KeyedMutex;
use super::interaction::{
    Interaction, InteractionOutcome, InteractionRegistry, PendingInteraction, Target, handler,
};
use super::limits::{LimitTable, TOTAL_BUCKET};
use super::lock::{
    DeleteOutcome, DeleteScope, InMemoryLockRepository, Location, Lock, LockId, LockRepository,
    LockType, UserId,
};
use crate::error::{Error, Result};

/// Runtime settings the manager consults on every operation.
///
/// Resource kinds are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockSettings {
    lockable: HashSet<String>,
    restricted: HashSet<String>,
    protect_below: HashSet<String>,
    limits: LimitTable,
    protect_from_redstone: bool,
}

fn normalize_kinds<I, S>(kinds: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    kinds
        .into_iter()
        .map(|kind| kind.as_ref().trim().to_lowercase())
        .filter(|kind| !kind.is_empty())
        .collect()
}

impl LockSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lockable<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lockable = normalize_kinds(kinds);
        self
    }

    pub fn with_restricted<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.restricted = normalize_kinds(kinds);
        self
    }

    pub fn with_protect_below<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.protect_below = normalize_kinds(kinds);
        self
    }

    pub fn with_limits(mut self, limits: LimitTable) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_protect_from_redstone(mut self, protect: bool) -> Self {
        self.protect_from_redstone = protect;
        self
    }

    pub fn is_lockable(&self, kind: &str) -> bool {
        self.lockable.contains(&kind.to_lowercase())
    }

    pub fn is_restricted(&self, kind: &str) -> bool {
        self.restricted.contains(&kind.to_lowercase())
    }

    pub fn is_protect_below(&self, kind: &str) -> bool {
        self.protect_below.contains(&kind.to_lowercase())
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    pub fn protect_from_redstone(&self) -> bool {
        self.protect_from_redstone
    }

    pub fn lockable(&self) -> &HashSet<String> {
        &self.lockable
    }

    pub fn restricted(&self) -> &HashSet<String> {
        &self.restricted
    }

    pub fn protect_below(&self) -> &HashSet<String> {
        &self.protect_below
    }
}

/// Central lock facade
pub struct LockManager {
    repository: Arc<dyn LockRepository>,
    codec: CredentialCodec,
    settings: RwLock<Arc<LockSettings>>,
    interactions: InteractionRegistry,
    bypassing: DashSet<UserId>,
    /// Serializes read-modify-write of one lock record
    record_locks: KeyedMutex<LockId>,
    /// Serializes limit check + commit per owner
    owner_locks: KeyedMutex<UserId>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("settings", &self.settings())
            .field("pending_interactions", &self.interactions.len())
            .field("bypassing", &self.bypassing.len())
            .finish_non_exhaustive()
    }
}

impl LockManager {
    /// Create a manager over the given store
    pub fn new(repository: Arc<dyn LockRepository>, settings: LockSettings) -> Self {
        Self {
            repository,
            codec: CredentialCodec::default(),
            settings: RwLock::new(Arc::new(settings)),
            interactions: InteractionRegistry::new(),
            bypassing: DashSet::new(),
            record_locks: KeyedMutex::new(),
            owner_locks: KeyedMutex::new(),
        }
    }

    /// Create a manager backed by a fresh in-memory store
    pub fn in_memory(settings: LockSettings) -> Self {
        Self::new(Arc::new(InMemoryLockRepository::new()), settings)
    }

    /// Replace the credential codec (e.g. with configured hashing costs)
    pub fn with_codec(mut self, codec: CredentialCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn repository(&self) -> &Arc<dyn LockRepository> {
        &self.repository
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    // ========== Settings ==========

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<LockSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in new settings; operations already running keep their snapshot
    pub fn reload(&self, settings: LockSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
        info!("Lock settings reloaded");
    }

    fn update_settings(&self, f: impl FnOnce(&mut LockSettings)) {
        let mut slot = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = LockSettings::clone(&slot);
        f(&mut next);
        *slot = Arc::new(next);
    }

    pub fn set_lockable_kinds<I, S>(&self, kinds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = normalize_kinds(kinds);
        self.update_settings(|s| s.lockable = kinds);
    }

    pub fn set_restricted_kinds<I, S>(&self, kinds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = normalize_kinds(kinds);
        self.update_settings(|s| s.restricted = kinds);
    }

    pub fn set_protect_below_kinds<I, S>(&self, kinds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = normalize_kinds(kinds);
        self.update_settings(|s| s.protect_below = kinds);
    }

    pub fn set_limits(&self, limits: LimitTable) {
        self.update_settings(|s| s.limits = limits);
    }

    pub fn limits(&self) -> LimitTable {
        self.settings().limits.clone()
    }

    pub fn protect_from_redstone(&self) -> bool {
        self.settings().protect_from_redstone
    }

    pub fn set_protect_from_redstone(&self, protect: bool) {
        self.update_settings(|s| s.protect_from_redstone = protect);
    }

    // ========== Resource classes ==========

    pub fn is_lockable(&self, kind: &str) -> bool {
        self.settings().is_lockable(kind)
    }

    pub fn is_restricted(&self, kind: &str) -> bool {
        self.settings().is_restricted(kind)
    }

    pub fn is_protect_below(&self, kind: &str) -> bool {
        self.settings().is_protect_below(kind)
    }

    // ========== Bypass ==========

    pub fn set_bypassing(&self, user: UserId) {
        if self.bypassing.insert(user) {
            info!(user = %user, "Bypass enabled");
        }
    }

    pub fn remove_bypassing(&self, user: UserId) {
        if self.bypassing.remove(&user).is_some() {
            info!(user = %user, "Bypass disabled");
        }
    }

    pub fn is_bypassing(&self, user: UserId) -> bool {
        self.bypassing.contains(&user)
    }

    /// Owner of `lock`, or an administrator overriding ownership
    pub fn may_administer(&self, lock: &Lock, user: UserId) -> bool {
        lock.is_owner(user) || self.is_bypassing(user)
    }

    // ========== Pending interactions ==========

    /// Stage an interaction; replaces whatever the user had staged
    pub fn set_interaction(&self, user: UserId, interaction: impl Into<PendingInteraction>) {
        let interaction = interaction.into();
        debug!(
            user = %user,
            interaction = %interaction.interaction(),
            persist = interaction.should_persist(),
            "Staged interaction"
        );
        self.interactions.set(user, interaction);
    }

    pub fn get_interaction(&self, user: UserId) -> Option<PendingInteraction> {
        self.interactions.get(user)
    }

    pub fn has_interaction(&self, user: UserId) -> bool {
        self.interactions.contains(user)
    }

    pub fn clear_interaction(&self, user: UserId) -> Option<PendingInteraction> {
        self.interactions.clear(user)
    }

    /// Apply the user's staged interaction (or a plain unlock) to a target.
    ///
    /// One-shot interactions are cleared before they run, whether or not
    /// they succeed; persisting ones stay staged unchanged.
    pub async fn handle_target(&self, user: UserId, target: &Target) -> Result<InteractionOutcome> {
        let interaction = self
            .interactions
            .take_for_target(user)
            .map(PendingInteraction::into_interaction)
            .unwrap_or_default();
        self.apply_interaction(user, &interaction, target).await
    }

    /// Apply an interaction to a target without touching the registry
    pub async fn apply_interaction(
        &self,
        user: UserId,
        interaction: &Interaction,
        target: &Target,
    ) -> Result<InteractionOutcome> {
        let result = match interaction {
            Interaction::Create(create) => handler::apply_create(self, user, create, target).await,
            Interaction::Change(change) => handler::apply_change(self, user, change, target).await,
            Interaction::Delete(_) => handler::apply_delete(self, user, target).await,
            Interaction::Unlock(attempt) => handler::apply_unlock(self, user, attempt, target).await,
        };

        match &result {
            Ok(outcome) => debug!(
                user = %user,
                interaction = %interaction,
                location = %target.location,
                lock_id = %outcome.lock().id,
                "Interaction applied"
            ),
            Err(e) if e.is_storage_failure() => tracing::error!(
                user = %user,
                interaction = %interaction,
                location = %target.location,
                error = %e,
                "Interaction failed on storage"
            ),
            Err(e) => warn!(
                user = %user,
                interaction = %interaction,
                location = %target.location,
                code = e.code(),
                "Interaction refused: {}",
                e
            ),
        }
        result
    }

    // ========== Lock operations ==========

    pub async fn get_lock(&self, location: &Location) -> Result<Option<Lock>> {
        self.repository.find_by_location(location).await
    }

    pub async fn get_lock_by_id(&self, id: LockId) -> Result<Option<Lock>> {
        self.repository.find_by_id(id).await
    }

    /// Persist a new lock. Uniqueness and limit checks are the caller's job;
    /// the store still rejects taken locations and names.
    pub async fn create_lock(&self, lock: &Lock) -> Result<()> {
        self.repository.create(lock).await?;
        info!(
            lock_id = %lock.id,
            owner = %lock.owner,
            lock_type = %lock.lock_type,
            locations = lock.locations.len(),
            "Lock created"
        );
        Ok(())
    }

    /// Remove the lock at `location`.
    ///
    /// With `cascade_all` every location of the lock goes in one operation;
    /// otherwise only `location` is detached and the lock survives while it
    /// still protects something.
    pub async fn delete_lock(&self, location: &Location, cascade_all: bool) -> Result<DeleteOutcome> {
        let Some(found) = self.get_lock(location).await? else {
            return Ok(DeleteOutcome::Missing);
        };
        let guard = self.record_locks.lock(&found.id).await;
        let scope = if cascade_all {
            DeleteScope::Entire
        } else {
            DeleteScope::Location(location.clone())
        };
        let outcome = self.remove_lock(found.id, scope).await;
        drop(guard);
        if matches!(outcome, Ok(DeleteOutcome::LockRemoved)) {
            self.record_locks.forget(&found.id);
        }
        outcome
    }

    /// Store-level delete; the caller holds the record guard
    pub(crate) async fn remove_lock(&self, id: LockId, scope: DeleteScope) -> Result<DeleteOutcome> {
        let outcome = self.repository.delete(id, scope).await?;
        match outcome {
            DeleteOutcome::LockRemoved => info!(lock_id = %id, "Lock deleted"),
            DeleteOutcome::LocationRemoved => info!(lock_id = %id, "Lock location removed"),
            DeleteOutcome::Missing => debug!(lock_id = %id, "Nothing to delete"),
        }
        Ok(outcome)
    }

    /// Grant standing access; no-op if the user can already access it.
    ///
    /// Runs under the lock's record guard against the stored record, so a
    /// concurrent Change cannot write back an accessor list without it.
    /// `lock` is refreshed to the stored state.
    pub async fn add_lock_access(&self, lock: &mut Lock, user: UserId) -> Result<()> {
        let _guard = self.record_locks.lock(&lock.id).await;
        let mut current = self.reread(lock.id).await?;
        self.grant_access_held(&mut current, user).await?;
        *lock = current;
        Ok(())
    }

    /// Revoke standing access; no-op if the user has none
    pub async fn remove_lock_access(&self, lock: &mut Lock, user: UserId) -> Result<()> {
        let _guard = self.record_locks.lock(&lock.id).await;
        let mut current = self.reread(lock.id).await?;
        if !current.accessors.contains(&user) {
            debug!(lock_id = %current.id, user = %user, "No access to revoke");
            *lock = current;
            return Ok(());
        }
        self.repository.revoke_access(current.id, user).await?;
        current.remove_accessor(user);
        info!(lock_id = %current.id, user = %user, "Access revoked");
        *lock = current;
        Ok(())
    }

    pub async fn remove_all_lock_access(&self, lock: &mut Lock) -> Result<()> {
        let _guard = self.record_locks.lock(&lock.id).await;
        let mut current = self.reread(lock.id).await?;
        if !current.accessors.is_empty() {
            self.repository.revoke_all_access(current.id).await?;
            current.clear_accessors();
            info!(lock_id = %current.id, "All access revoked");
        }
        *lock = current;
        Ok(())
    }

    async fn reread(&self, id: LockId) -> Result<Lock> {
        self.repository.find_by_id(id).await?.ok_or(Error::NotFound)
    }

    /// Grant on a record read under its guard; the caller holds the guard
    pub(crate) async fn grant_access_held(&self, lock: &mut Lock, user: UserId) -> Result<()> {
        if lock.can_access(user) {
            debug!(lock_id = %lock.id, user = %user, "Access already present");
            return Ok(());
        }
        self.repository.grant_access(lock.id, user).await?;
        lock.add_accessor(user);
        info!(lock_id = %lock.id, user = %user, "Access granted");
        Ok(())
    }

    /// Extend a lock to another location; no-op if it already covers it
    pub async fn add_lock_location(&self, lock: &mut Lock, location: &Location) -> Result<()> {
        if lock.contains_location(location) {
            return Ok(());
        }
        let _guard = self.record_locks.lock(&lock.id).await;
        self.repository.add_location(lock.id, location).await?;
        lock.locations.push(location.clone());
        info!(lock_id = %lock.id, location = %location, "Lock location added");
        Ok(())
    }

    /// Full-record attribute write (locations untouched)
    pub async fn update_lock_attributes(&self, lock: &Lock) -> Result<()> {
        self.repository.update_attributes(lock).await?;
        info!(lock_id = %lock.id, owner = %lock.owner, "Lock updated");
        Ok(())
    }

    /// Every lock owned by `user`
    pub async fn players_locks(&self, user: UserId) -> Result<Vec<Lock>> {
        self.repository.find_by_owner(user).await
    }

    pub async fn is_unique_name(&self, user: UserId, name: &str) -> Result<bool> {
        self.repository.is_name_unique(user, name).await
    }

    /// Whether the lock's type and password material agree
    pub fn is_password_compatible(&self, lock: &Lock) -> bool {
        lock.lock_type.is_password() == lock.password.is_some()
    }

    // ========== Limits ==========

    /// The owner's lock counts per bucket, including `total`
    pub async fn lock_counts(&self, user: UserId) -> Result<HashMap<String, u32>> {
        let by_type = self.repository.count_locks_by_type(user).await?;
        Ok(self.settings().limits.bucket_counts(&by_type))
    }

    /// Whether `user` may not gain another lock of `lock_type`
    pub async fn is_player_at_lock_limit(&self, user: UserId, lock_type: LockType) -> Result<bool> {
        Ok(self.limit_violation(user, lock_type, None).await?.is_some())
    }

    /// The bucket `owner` would overflow by holding one more `lock_type` lock.
    ///
    /// `existing` is the lock being re-typed or transferred, if any; it does
    /// not count against itself in buckets it already occupies for `owner`.
    pub(crate) async fn limit_violation(
        &self,
        owner: UserId,
        lock_type: LockType,
        existing: Option<&Lock>,
    ) -> Result<Option<(String, u32)>> {
        let settings = self.settings();
        let table = &settings.limits;
        if table.limits().is_empty() {
            return Ok(None);
        }

        let by_type = self.repository.count_locks_by_type(owner).await?;
        let counts = table.bucket_counts(&by_type);
        let mut counted = Vec::new();
        if let Some(existing) = existing.filter(|lock| lock.owner == owner) {
            counted.push(table.bucket_for(existing.lock_type));
            counted.push(TOTAL_BUCKET);
        }
        Ok(table.exceeded_bucket(lock_type, &counts, &counted))
    }

    // ========== Internals shared with the interaction handlers ==========

    pub(crate) fn record_locks(&self) -> &KeyedMutex<LockId> {
        &self.record_locks
    }

    pub(crate) fn owner_locks(&self) -> &KeyedMutex<UserId> {
        &self.owner_locks
    }

    /// Hash a password off the async worker threads
    pub(crate) async fn seal_password(&self, password: &Secret) -> Result<PasswordMaterial> {
        let codec = self.codec.clone();
        let password = password.clone();
        tokio::task::spawn_blocking(move || codec.seal(password.expose()))
            .await
            .map_err(|e| Error::InvalidInput(format!("password hashing was interrupted: {}", e)))?
    }

    /// Verify a password off the async worker threads
    pub(crate) async fn verify_password(
        &self,
        password: &Secret,
        material: &PasswordMaterial,
    ) -> Result<bool> {
        let codec = self.codec.clone();
        let password = password.clone();
        let material = material.clone();
        tokio::task::spawn_blocking(move || codec.verify_material(password.expose(), &material))
            .await
            .map_err(|e| Error::InvalidInput(format!("password check was interrupted: {}", e)))?
    }
}
