//! Concurrent use of one lock manager from many tasks

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use latch_core::domain::{
    ChangeLock, CreateLock, CredentialCodec, DeleteOutcome, DeleteScope, HashingParams,
    InMemoryLockRepository, Interaction, LimitTable, Location, Lock, LockId, LockManager,
    LockRepository, LockSettings, LockType, SqliteLockRepository, Target, UserId,
};
use latch_core::storage::Database;
use latch_core::{Error, ErrorCategory};
use tokio::sync::Notify;
use uuid::Uuid;

const CHEST: &str = "minecraft:chest";

fn fast_codec() -> CredentialCodec {
    CredentialCodec::new(HashingParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}

async fn managers(limits: LimitTable) -> Vec<(&'static str, Arc<LockManager>)> {
    let db = Database::in_memory().await.unwrap();
    let stores: Vec<(&'static str, Arc<dyn LockRepository>)> = vec![
        ("memory", Arc::new(InMemoryLockRepository::new())),
        ("sqlite", Arc::new(SqliteLockRepository::new(db.pool().clone()))),
    ];
    stores
        .into_iter()
        .map(|(name, store)| {
            let settings = LockSettings::new()
                .with_lockable([CHEST])
                .with_limits(limits.clone());
            (
                name,
                Arc::new(LockManager::new(store, settings).with_codec(fast_codec())),
            )
        })
        .collect()
}

fn at(x: i32) -> Location {
    Location::new("world", x, 64, 0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_winner_per_location() {
    for (store, manager) in managers(LimitTable::default()).await {
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                let user = Uuid::new_v4();
                manager
                    .apply_interaction(
                        user,
                        &Interaction::Create(CreateLock::new()),
                        &Target::new(at(1), CHEST).with_partner(at(2)),
                    )
                    .await
            }));
        }

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(
                    matches!(e, Error::AlreadyLocked | Error::PartnerLocked(_)),
                    "{}: {}",
                    store,
                    e
                ),
            }
        }
        assert_eq!(created, 1, "{}", store);

        let first = manager.get_lock(&at(1)).await.unwrap().unwrap();
        let second = manager.get_lock(&at(2)).await.unwrap().unwrap();
        assert_eq!(first.id, second.id, "{}", store);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_holds_under_concurrent_creates() {
    let limits = LimitTable::from_limits([("owner_only", 3)]);
    for (store, manager) in managers(limits).await {
        let user = Uuid::new_v4();
        let mut tasks = Vec::new();
        for x in 0..12 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager
                    .apply_interaction(
                        user,
                        &Interaction::Create(CreateLock::new()),
                        &Target::new(at(x * 4), CHEST),
                    )
                    .await
            }));
        }

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.category(), ErrorCategory::LimitExceeded, "{}", store),
            }
        }
        assert_eq!(created, 3, "{}", store);
        assert_eq!(manager.players_locks(user).await.unwrap().len(), 3, "{}", store);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access_grants_all_land() {
    for (store, manager) in managers(LimitTable::default()).await {
        let owner = Uuid::new_v4();
        manager
            .apply_interaction(owner, &Interaction::Create(CreateLock::new()), &Target::new(at(1), CHEST))
            .await
            .unwrap();

        let users: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        let mut tasks = Vec::new();
        for user in users.clone() {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                let mut lock = manager.get_lock(&at(1)).await?.ok_or(Error::NotFound)?;
                manager.add_lock_access(&mut lock, user).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let lock = manager.get_lock(&at(1)).await.unwrap().unwrap();
        assert_eq!(lock.accessors.len(), users.len(), "{}", store);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_half_a_pair() {
    for (store, manager) in managers(LimitTable::default()).await {
        let owner = Uuid::new_v4();

        let reader = {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some(lock) = manager.get_lock(&at(2)).await? {
                        assert_eq!(lock.locations.len(), 2);
                    }
                    tokio::task::yield_now().await;
                }
                Ok::<_, Error>(())
            })
        };

        for _ in 0..20 {
            manager
                .apply_interaction(
                    owner,
                    &Interaction::Create(CreateLock::new()),
                    &Target::new(at(1), CHEST).with_partner(at(2)),
                )
                .await
                .unwrap();
            manager.delete_lock(&at(1), true).await.unwrap();
        }

        reader.await.unwrap().unwrap();
        assert!(manager.get_lock(&at(2)).await.unwrap().is_none(), "{}", store);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registry_and_bypass_are_per_user() {
    let (_, manager) = managers(LimitTable::default()).await.remove(0);
    let users: Vec<Uuid> = (0..32).map(|_| Uuid::new_v4()).collect();

    let mut tasks = Vec::new();
    for (i, user) in users.iter().copied().enumerate() {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            manager.set_interaction(user, Interaction::Create(CreateLock::new()));
            if i % 2 == 0 {
                manager.set_bypassing(user);
            }
            manager.reload(LockSettings::new().with_lockable([CHEST]));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for (i, user) in users.iter().enumerate() {
        assert!(manager.has_interaction(*user));
        assert_eq!(manager.is_bypassing(*user), i % 2 == 0);
    }
}

/// In-memory store whose next limit count stops until released
#[derive(Default)]
struct PausingRepository {
    inner: InMemoryLockRepository,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

#[async_trait]
impl LockRepository for PausingRepository {
    async fn find_by_location(&self, location: &Location) -> latch_core::Result<Option<Lock>> {
        self.inner.find_by_location(location).await
    }

    async fn find_by_id(&self, id: LockId) -> latch_core::Result<Option<Lock>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_owner(&self, owner: UserId) -> latch_core::Result<Vec<Lock>> {
        self.inner.find_by_owner(owner).await
    }

    async fn is_name_unique(&self, owner: UserId, name: &str) -> latch_core::Result<bool> {
        self.inner.is_name_unique(owner, name).await
    }

    async fn count_locks_by_type(
        &self,
        owner: UserId,
    ) -> latch_core::Result<HashMap<LockType, u32>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.count_locks_by_type(owner).await
    }

    async fn create(&self, lock: &Lock) -> latch_core::Result<()> {
        self.inner.create(lock).await
    }

    async fn delete(&self, id: LockId, scope: DeleteScope) -> latch_core::Result<DeleteOutcome> {
        self.inner.delete(id, scope).await
    }

    async fn add_location(&self, id: LockId, location: &Location) -> latch_core::Result<()> {
        self.inner.add_location(id, location).await
    }

    async fn grant_access(&self, id: LockId, user: UserId) -> latch_core::Result<()> {
        self.inner.grant_access(id, user).await
    }

    async fn revoke_access(&self, id: LockId, user: UserId) -> latch_core::Result<()> {
        self.inner.revoke_access(id, user).await
    }

    async fn revoke_all_access(&self, id: LockId) -> latch_core::Result<()> {
        self.inner.revoke_all_access(id).await
    }

    async fn update_attributes(&self, lock: &Lock) -> latch_core::Result<()> {
        self.inner.update_attributes(lock).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_grant_during_change_survives_the_change() {
    let repository = Arc::new(PausingRepository::default());
    let settings = LockSettings::new()
        .with_lockable([CHEST])
        .with_limits(LimitTable::from_limits([("total", 100)]));
    let manager = Arc::new(LockManager::new(repository.clone(), settings).with_codec(fast_codec()));
    let (owner, friend) = (Uuid::new_v4(), Uuid::new_v4());
    let target = Target::new(at(1), CHEST);

    manager
        .apply_interaction(owner, &Interaction::Create(CreateLock::new()), &target)
        .await
        .unwrap();

    // The re-type re-checks limits and stops inside the count
    repository.armed.store(true, Ordering::SeqCst);
    let change = {
        let manager = manager.clone();
        let target = target.clone();
        tokio::spawn(async move {
            manager
                .apply_interaction(
                    owner,
                    &Interaction::Change(ChangeLock::new().with_type(LockType::SharedList)),
                    &target,
                )
                .await
        })
    };
    repository.reached.notified().await;

    let grant = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut lock = manager.get_lock(&at(1)).await?.ok_or(Error::NotFound)?;
            manager.add_lock_access(&mut lock, friend).await?;
            Ok::<_, Error>(lock)
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!grant.is_finished(), "grant must wait for the change in progress");

    repository.release.notify_one();
    change.await.unwrap().unwrap();
    let granted = grant.await.unwrap().unwrap();
    assert!(granted.accessors.contains(&friend));
    assert_eq!(granted.lock_type, LockType::SharedList);

    let stored = manager.get_lock(&at(1)).await.unwrap().unwrap();
    assert_eq!(stored.lock_type, LockType::SharedList);
    assert!(stored.accessors.contains(&friend));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_revoke_during_change_survives_the_change() {
    let repository = Arc::new(PausingRepository::default());
    let settings = LockSettings::new()
        .with_lockable([CHEST])
        .with_limits(LimitTable::from_limits([("total", 100)]));
    let manager = Arc::new(LockManager::new(repository.clone(), settings).with_codec(fast_codec()));
    let (owner, friend) = (Uuid::new_v4(), Uuid::new_v4());
    let target = Target::new(at(1), CHEST);

    manager
        .apply_interaction(
            owner,
            &Interaction::Create(CreateLock::new().with_type(LockType::SharedList)),
            &target,
        )
        .await
        .unwrap();
    let mut lock = manager.get_lock(&at(1)).await.unwrap().unwrap();
    manager.add_lock_access(&mut lock, friend).await.unwrap();

    repository.armed.store(true, Ordering::SeqCst);
    let change = {
        let manager = manager.clone();
        let target = target.clone();
        tokio::spawn(async move {
            manager
                .apply_interaction(
                    owner,
                    &Interaction::Change(ChangeLock::new().with_type(LockType::OwnerOnly)),
                    &target,
                )
                .await
        })
    };
    repository.reached.notified().await;

    let revoke = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.remove_lock_access(&mut lock, friend).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!revoke.is_finished());

    repository.release.notify_one();
    change.await.unwrap().unwrap();
    revoke.await.unwrap().unwrap();

    let stored = manager.get_lock(&at(1)).await.unwrap().unwrap();
    assert_eq!(stored.lock_type, LockType::OwnerOnly);
    assert!(stored.accessors.is_empty());
}
