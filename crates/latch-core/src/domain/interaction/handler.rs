//! Apply step for each interaction variant
//!
//! Every handler validates first and writes last. A handler that returns an
//! error has made no change to the store.

use tracing::{debug, info};

use super::types::{AccessGrant, ChangeLock, CreateLock, InteractionOutcome, Target, UnlockAttempt};
use crate::domain::credentials::Secret;
use crate::domain::lock::{DeleteOutcome, DeleteScope, Lock, LockType, UserId, object_label};
use crate::domain::manager::LockManager;
use crate::domain::naming::generate_lock_name;
use crate::error::{Error, Result};

fn non_blank_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("lock name cannot be empty".to_string()));
    }
    Ok(())
}

fn non_blank_password(password: &Secret) -> Result<()> {
    if password.is_blank() {
        return Err(Error::InvalidInput("password cannot be empty".to_string()));
    }
    Ok(())
}

fn password_not_applicable(lock_type: LockType) -> Error {
    Error::InvalidInput(format!("{} locks do not take a password", lock_type))
}

pub(crate) async fn apply_create(
    manager: &LockManager,
    user: UserId,
    create: &CreateLock,
    target: &Target,
) -> Result<InteractionOutcome> {
    let settings = manager.settings();
    let kind = target.kind();
    if !settings.is_lockable(kind) {
        return Err(Error::NotLockable(object_label(kind).to_string()));
    }

    let lock_type = create.lock_type.unwrap_or_default();
    match (&create.password, lock_type.is_password()) {
        (Some(password), true) => non_blank_password(password)?,
        (None, true) => return Err(Error::PasswordRequired(lock_type.to_string())),
        (Some(_), false) => return Err(password_not_applicable(lock_type)),
        (None, false) => {}
    }
    if let Some(name) = &create.name {
        non_blank_name(name)?;
    }

    let password = match &create.password {
        Some(password) => Some(manager.seal_password(password).await?),
        None => None,
    };

    let owner_guard = manager.owner_locks().lock(&user).await;

    if manager.get_lock(&target.location).await?.is_some() {
        return Err(Error::AlreadyLocked);
    }
    if let Some(partner) = &target.snapshot.partner {
        if manager.get_lock(partner).await?.is_some() {
            return Err(Error::PartnerLocked(object_label(kind).to_string()));
        }
    }
    if let Some((bucket, limit)) = manager.limit_violation(user, lock_type, None).await? {
        return Err(Error::LimitExceeded { bucket, limit });
    }

    let name = match &create.name {
        Some(name) => {
            if !manager.is_unique_name(user, name).await? {
                return Err(Error::NameConflict(name.clone()));
            }
            name.clone()
        }
        None => generate_lock_name(manager.repository().as_ref(), user, kind).await?,
    };

    let mut locations = vec![target.location.clone()];
    if let Some(partner) = &target.snapshot.partner {
        if *partner != target.location {
            locations.push(partner.clone());
        }
    }

    let mut lock = Lock::new(user, name, lock_type, locations, kind);
    lock.protect_from_redstone = create
        .protect_from_redstone
        .unwrap_or(settings.protect_from_redstone());
    lock.password = password;

    manager.create_lock(&lock).await?;
    drop(owner_guard);
    Ok(InteractionOutcome::Created(lock))
}

pub(crate) async fn apply_change(
    manager: &LockManager,
    user: UserId,
    change: &ChangeLock,
    target: &Target,
) -> Result<InteractionOutcome> {
    if let Some(name) = &change.name {
        non_blank_name(name)?;
    }
    if let Some(password) = &change.password {
        non_blank_password(password)?;
    }

    let found = manager
        .get_lock(&target.location)
        .await?
        .ok_or(Error::NotFound)?;
    let _record_guard = manager.record_locks().lock(&found.id).await;
    // Re-read under the guard; the lock may have changed or gone meanwhile
    let current = manager
        .get_lock_by_id(found.id)
        .await?
        .ok_or(Error::NotFound)?;

    if !manager.may_administer(&current, user) {
        return Err(Error::NotOwner);
    }

    let new_owner = change.new_owner.unwrap_or(current.owner);
    let new_type = change.lock_type.unwrap_or(current.lock_type);
    if change.password.is_some() && !new_type.is_password() {
        return Err(password_not_applicable(new_type));
    }
    if new_type.is_password() && current.password.is_none() && change.password.is_none() {
        return Err(Error::PasswordRequired(new_type.to_string()));
    }

    let new_password = match &change.password {
        Some(password) => Some(manager.seal_password(password).await?),
        None => None,
    };

    let _owner_guards = manager
        .owner_locks()
        .lock_all(&[current.owner, new_owner])
        .await;

    if change.affects_limits() {
        if let Some((bucket, limit)) = manager
            .limit_violation(new_owner, new_type, Some(&current))
            .await?
        {
            return Err(Error::ChangeLimitExceeded { bucket, limit });
        }
    }

    let mut updated = current.clone();
    if let Some(lock_type) = change.lock_type {
        updated.set_type(lock_type);
    }
    if let Some(material) = new_password {
        updated.password = Some(material);
        updated.clear_accessors();
    }

    if let Some(name) = &change.name {
        let keeps_own_name = new_owner == current.owner && name.to_lowercase() == current.name_key();
        if !keeps_own_name && !manager.is_unique_name(new_owner, name).await? {
            return Err(Error::NameConflict(name.clone()));
        }
        updated.name = name.clone();
    }

    if new_owner != current.owner {
        if change.name.is_none() && !manager.is_unique_name(new_owner, &updated.name).await? {
            let fallback =
                generate_lock_name(manager.repository().as_ref(), new_owner, &updated.locked_object)
                    .await?;
            debug!(
                lock_id = %current.id,
                from = %updated.name,
                to = %fallback,
                "Renamed lock on transfer to avoid a name collision"
            );
            updated.name = fallback;
        }
        updated.set_owner(new_owner);
    }

    for member in &change.members_to_add {
        updated.add_accessor(*member);
    }
    for member in &change.members_to_remove {
        updated.remove_accessor(*member);
    }
    if let Some(protect) = change.protect_from_redstone {
        updated.protect_from_redstone = protect;
    }

    if updated == current {
        debug!(lock_id = %current.id, "Change left the lock as it was");
        return Ok(InteractionOutcome::Changed {
            lock: updated,
            persisted: false,
        });
    }

    updated.touch();
    manager.update_lock_attributes(&updated).await?;
    Ok(InteractionOutcome::Changed {
        lock: updated,
        persisted: true,
    })
}

pub(crate) async fn apply_delete(
    manager: &LockManager,
    user: UserId,
    target: &Target,
) -> Result<InteractionOutcome> {
    let found = manager
        .get_lock(&target.location)
        .await?
        .ok_or(Error::NotFound)?;
    let record_guard = manager.record_locks().lock(&found.id).await;
    let current = manager
        .get_lock_by_id(found.id)
        .await?
        .ok_or(Error::NotFound)?;

    if !manager.may_administer(&current, user) {
        return Err(Error::NotOwner);
    }

    let outcome = manager.remove_lock(current.id, DeleteScope::Entire).await?;
    drop(record_guard);
    manager.record_locks().forget(&current.id);

    match outcome {
        DeleteOutcome::Missing => Err(Error::NotFound),
        _ => Ok(InteractionOutcome::Deleted(current)),
    }
}

pub(crate) async fn apply_unlock(
    manager: &LockManager,
    user: UserId,
    attempt: &UnlockAttempt,
    target: &Target,
) -> Result<InteractionOutcome> {
    let lock = manager
        .get_lock(&target.location)
        .await?
        .ok_or(Error::NotFound)?;

    let grant = if lock.is_owner(user) {
        AccessGrant::Owner
    } else if lock.accessors.contains(&user) {
        AccessGrant::Accessor
    } else if manager.is_bypassing(user) {
        AccessGrant::Bypass
    } else {
        match lock.lock_type {
            LockType::PasswordAlways | LockType::PasswordOnce => {
                return unlock_with_password(manager, user, attempt, lock).await;
            }
            LockType::Display => AccessGrant::ViewOnly,
            LockType::OwnerOnly | LockType::SharedList => return Err(Error::AccessDenied),
        }
    };

    Ok(InteractionOutcome::Unlocked { lock, grant })
}

async fn unlock_with_password(
    manager: &LockManager,
    user: UserId,
    attempt: &UnlockAttempt,
    lock: Lock,
) -> Result<InteractionOutcome> {
    let Some(password) = &attempt.password else {
        return Err(Error::AccessDenied);
    };
    let material = lock
        .password
        .as_ref()
        .ok_or_else(|| Error::Parse(format!("lock {} has no password material", lock.id)))?;
    if !manager.verify_password(password, material).await? {
        return Err(Error::InvalidPassword);
    }

    if lock.lock_type != LockType::PasswordOnce {
        return Ok(InteractionOutcome::Unlocked {
            lock,
            grant: AccessGrant::Password,
        });
    }

    // Grant only if the password we checked is still the lock's password
    let _record_guard = manager.record_locks().lock(&lock.id).await;
    let mut current = manager
        .get_lock_by_id(lock.id)
        .await?
        .ok_or(Error::NotFound)?;
    if current.password != lock.password {
        return Err(Error::InvalidPassword);
    }
    manager.grant_access_held(&mut current, user).await?;
    info!(lock_id = %current.id, user = %user, "Standing access granted by password");

    Ok(InteractionOutcome::Unlocked {
        lock: current,
        grant: AccessGrant::PasswordRemembered,
    })
}
