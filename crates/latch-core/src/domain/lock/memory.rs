//! In-memory lock repository
//!
//! Records live in a `DashMap` so unrelated locks never contend. The
//! location and name indexes sit behind one short-lived `RwLock`; every
//! change to a lock's location set or name happens under its write half,
//! so both halves of a paired lock appear and disappear together for any
//! reader.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::entity::{Lock, LockId, LockType, Location, UserId};
use super::repository_trait::{DeleteOutcome, DeleteScope, LockRepository};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Index {
    by_location: HashMap<Location, LockId>,
    by_name: HashMap<(UserId, String), LockId>,
}

/// Lock repository backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryLockRepository {
    index: RwLock<Index>,
    records: DashMap<LockId, Lock>,
}

impl InMemoryLockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored locks
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, id: LockId) -> Option<Lock> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    fn remove_entire(&self, index: &mut Index, lock: &Lock) {
        for location in &lock.locations {
            index.by_location.remove(location);
        }
        index.by_name.remove(&(lock.owner, lock.name_key()));
        self.records.remove(&lock.id);
    }

    fn modify<F>(&self, id: LockId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Lock) -> bool,
    {
        let mut entry = self.records.get_mut(&id).ok_or(Error::NotFound)?;
        if f(entry.value_mut()) {
            entry.value_mut().touch();
        }
        Ok(())
    }
}

#[async_trait]
impl LockRepository for InMemoryLockRepository {
    async fn find_by_location(&self, location: &Location) -> Result<Option<Lock>> {
        let index = self.read_index();
        Ok(index
            .by_location
            .get(location)
            .and_then(|id| self.snapshot(*id)))
    }

    async fn find_by_id(&self, id: LockId) -> Result<Option<Lock>> {
        Ok(self.snapshot(id))
    }

    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Lock>> {
        let mut locks: Vec<Lock> = self
            .records
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.value().clone())
            .collect();
        locks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(locks)
    }

    async fn is_name_unique(&self, owner: UserId, name: &str) -> Result<bool> {
        let index = self.read_index();
        Ok(!index.by_name.contains_key(&(owner, name.to_lowercase())))
    }

    async fn count_locks_by_type(&self, owner: UserId) -> Result<HashMap<LockType, u32>> {
        let mut counts = HashMap::new();
        for entry in self.records.iter().filter(|entry| entry.owner == owner) {
            *counts.entry(entry.lock_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn create(&self, lock: &Lock) -> Result<()> {
        lock.validate()?;
        let mut index = self.write_index();

        if lock
            .locations
            .iter()
            .any(|location| index.by_location.contains_key(location))
        {
            return Err(Error::AlreadyLocked);
        }
        let name_key = (lock.owner, lock.name_key());
        if index.by_name.contains_key(&name_key) {
            return Err(Error::NameConflict(lock.name.clone()));
        }

        self.records.insert(lock.id, lock.clone());
        for location in &lock.locations {
            index.by_location.insert(location.clone(), lock.id);
        }
        index.by_name.insert(name_key, lock.id);

        debug!(lock_id = %lock.id, locations = lock.locations.len(), "Stored lock in memory");
        Ok(())
    }

    async fn delete(&self, id: LockId, scope: DeleteScope) -> Result<DeleteOutcome> {
        let mut index = self.write_index();
        let Some(lock) = self.snapshot(id) else {
            return Ok(DeleteOutcome::Missing);
        };

        match scope {
            DeleteScope::Entire => {
                self.remove_entire(&mut index, &lock);
                Ok(DeleteOutcome::LockRemoved)
            }
            DeleteScope::Location(location) => {
                if !lock.contains_location(&location) {
                    return Ok(DeleteOutcome::Missing);
                }
                if lock.locations.len() == 1 {
                    self.remove_entire(&mut index, &lock);
                    return Ok(DeleteOutcome::LockRemoved);
                }
                self.modify(id, |record| {
                    record.locations.retain(|l| l != &location);
                    true
                })?;
                index.by_location.remove(&location);
                Ok(DeleteOutcome::LocationRemoved)
            }
        }
    }

    async fn add_location(&self, id: LockId, location: &Location) -> Result<()> {
        let mut index = self.write_index();
        match index.by_location.get(location) {
            Some(existing) if *existing == id => return Ok(()),
            Some(_) => return Err(Error::AlreadyLocked),
            None => {}
        }
        self.modify(id, |record| {
            record.locations.push(location.clone());
            true
        })?;
        index.by_location.insert(location.clone(), id);
        Ok(())
    }

    async fn grant_access(&self, id: LockId, user: UserId) -> Result<()> {
        self.modify(id, |record| record.add_accessor(user))
    }

    async fn revoke_access(&self, id: LockId, user: UserId) -> Result<()> {
        self.modify(id, |record| record.remove_accessor(user))
    }

    async fn revoke_all_access(&self, id: LockId) -> Result<()> {
        self.modify(id, Lock::clear_accessors)
    }

    async fn update_attributes(&self, lock: &Lock) -> Result<()> {
        lock.validate()?;
        let mut index = self.write_index();
        let existing = self.snapshot(lock.id).ok_or(Error::NotFound)?;

        let old_key = (existing.owner, existing.name_key());
        let new_key = (lock.owner, lock.name_key());
        if old_key != new_key {
            if let Some(holder) = index.by_name.get(&new_key) {
                if *holder != lock.id {
                    return Err(Error::NameConflict(lock.name.clone()));
                }
            }
            index.by_name.remove(&old_key);
            index.by_name.insert(new_key, lock.id);
        }

        // Locations only change through create, add_location, and delete
        let mut record = lock.clone();
        record.locations = existing.locations;
        self.records.insert(lock.id, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn loc(x: i32) -> Location {
        Location::new("world", x, 64, 0)
    }

    fn lock_at(owner: UserId, name: &str, locations: Vec<Location>) -> Lock {
        Lock::new(owner, name, LockType::OwnerOnly, locations, "minecraft:chest")
    }

    #[tokio::test]
    async fn test_create_and_find_by_every_location() {
        let repo = InMemoryLockRepository::new();
        let lock = lock_at(Uuid::new_v4(), "door", vec![loc(1), loc(2)]);
        repo.create(&lock).await.unwrap();

        for location in [loc(1), loc(2)] {
            let found = repo.find_by_location(&location).await.unwrap().unwrap();
            assert_eq!(found.id, lock.id);
        }
        assert!(repo.find_by_location(&loc(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_location_maps_to_at_most_one_lock() {
        let repo = InMemoryLockRepository::new();
        let owner = Uuid::new_v4();
        repo.create(&lock_at(owner, "a", vec![loc(1)])).await.unwrap();

        let err = repo
            .create(&lock_at(owner, "b", vec![loc(2), loc(1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyLocked));
        assert!(repo.find_by_location(&loc(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_unique_per_owner_ignoring_case() {
        let repo = InMemoryLockRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        repo.create(&lock_at(alice, "Chest1", vec![loc(1)])).await.unwrap();

        assert!(!repo.is_name_unique(alice, "chest1").await.unwrap());
        assert!(repo.is_name_unique(bob, "CHEST1").await.unwrap());

        let err = repo
            .create(&lock_at(alice, "CHEST1", vec![loc(2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NameConflict(_)));
        repo.create(&lock_at(bob, "Chest1", vec![loc(3)])).await.unwrap();
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_both_halves() {
        let repo = InMemoryLockRepository::new();
        let lock = lock_at(Uuid::new_v4(), "door", vec![loc(1), loc(2)]);
        repo.create(&lock).await.unwrap();

        let outcome = repo.delete(lock.id, DeleteScope::Entire).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::LockRemoved);
        assert!(repo.find_by_location(&loc(1)).await.unwrap().is_none());
        assert!(repo.find_by_location(&loc(2)).await.unwrap().is_none());
        assert!(repo.is_name_unique(lock.owner, "door").await.unwrap());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_single_location_delete_keeps_partner() {
        let repo = InMemoryLockRepository::new();
        let lock = lock_at(Uuid::new_v4(), "door", vec![loc(1), loc(2)]);
        repo.create(&lock).await.unwrap();

        let outcome = repo
            .delete(lock.id, DeleteScope::Location(loc(1)))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::LocationRemoved);
        let remaining = repo.find_by_location(&loc(2)).await.unwrap().unwrap();
        assert_eq!(remaining.locations, vec![loc(2)]);

        let outcome = repo
            .delete(lock.id, DeleteScope::Location(loc(2)))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::LockRemoved);
        assert_eq!(
            repo.delete(lock.id, DeleteScope::Entire).await.unwrap(),
            DeleteOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_update_attributes_moves_name_index() {
        let repo = InMemoryLockRepository::new();
        let alice = Uuid::new_v4();
        let mut lock = lock_at(alice, "old", vec![loc(1)]);
        repo.create(&lock).await.unwrap();
        repo.create(&lock_at(alice, "taken", vec![loc(2)])).await.unwrap();

        lock.name = "Taken".to_string();
        let err = repo.update_attributes(&lock).await.unwrap_err();
        assert!(matches!(err, Error::NameConflict(_)));

        lock.name = "new".to_string();
        repo.update_attributes(&lock).await.unwrap();
        assert!(repo.is_name_unique(alice, "old").await.unwrap());
        assert!(!repo.is_name_unique(alice, "NEW").await.unwrap());
    }

    #[tokio::test]
    async fn test_access_grants_are_idempotent() {
        let repo = InMemoryLockRepository::new();
        let lock = lock_at(Uuid::new_v4(), "a", vec![loc(1)]);
        repo.create(&lock).await.unwrap();
        let friend = Uuid::new_v4();

        repo.grant_access(lock.id, friend).await.unwrap();
        repo.grant_access(lock.id, friend).await.unwrap();
        repo.grant_access(lock.id, lock.owner).await.unwrap();
        let stored = repo.find_by_id(lock.id).await.unwrap().unwrap();
        assert_eq!(stored.accessors.len(), 1);

        repo.revoke_all_access(lock.id).await.unwrap();
        repo.revoke_access(lock.id, friend).await.unwrap();
        let stored = repo.find_by_id(lock.id).await.unwrap().unwrap();
        assert!(stored.accessors.is_empty());
    }

    #[tokio::test]
    async fn test_count_by_type() {
        let repo = InMemoryLockRepository::new();
        let owner = Uuid::new_v4();
        repo.create(&lock_at(owner, "a", vec![loc(1)])).await.unwrap();
        repo.create(&lock_at(owner, "b", vec![loc(2)])).await.unwrap();
        let mut shared = lock_at(owner, "c", vec![loc(3)]);
        shared.lock_type = LockType::SharedList;
        repo.create(&shared).await.unwrap();

        let counts = repo.count_locks_by_type(owner).await.unwrap();
        assert_eq!(counts.get(&LockType::OwnerOnly), Some(&2));
        assert_eq!(counts.get(&LockType::SharedList), Some(&1));
        assert!(repo.count_locks_by_type(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_location() {
        let repo = InMemoryLockRepository::new();
        let owner = Uuid::new_v4();
        let lock = lock_at(owner, "a", vec![loc(1)]);
        let other = lock_at(owner, "b", vec![loc(5)]);
        repo.create(&lock).await.unwrap();
        repo.create(&other).await.unwrap();

        repo.add_location(lock.id, &loc(2)).await.unwrap();
        repo.add_location(lock.id, &loc(2)).await.unwrap();
        assert!(matches!(
            repo.add_location(lock.id, &loc(5)).await.unwrap_err(),
            Error::AlreadyLocked
        ));
        let stored = repo.find_by_location(&loc(2)).await.unwrap().unwrap();
        assert_eq!(stored.locations, vec![loc(1), loc(2)]);
    }
}
