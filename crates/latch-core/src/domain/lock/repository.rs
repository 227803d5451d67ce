//! SQLite lock repository
//!
//! A lock is spread over three tables (`locks`, `lock_locations`,
//! `lock_accessors`). Every read and write of one lock runs inside a single
//! transaction, so readers never see half of a record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

use super::entity::{Lock, LockId, LockType, Location, UserId};
use super::repository_trait::{DeleteOutcome, DeleteScope, LockRepository};
use crate::domain::credentials::PasswordMaterial;
use crate::error::{Error, Result};

const LOCK_COLUMNS: &str = "id, owner, name, lock_type, locked_object, password_hash, salt, \
     protect_from_redstone, created_at, updated_at";

/// Lock repository backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteLockRepository {
    pool: SqlitePool,
}

impl SqliteLockRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn find_by_location(&self, location: &Location) -> Result<Option<Lock>> {
        let mut tx = self.pool.begin().await?;
        let Some(id) = lock_id_at(&mut *tx, location).await? else {
            return Ok(None);
        };
        let lock = load_lock(&mut *tx, &id).await?;
        tx.commit().await?;
        Ok(lock)
    }

    async fn find_by_id(&self, id: LockId) -> Result<Option<Lock>> {
        let mut tx = self.pool.begin().await?;
        let lock = load_lock(&mut *tx, &id.to_string()).await?;
        tx.commit().await?;
        Ok(lock)
    }

    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Lock>> {
        let mut tx = self.pool.begin().await?;
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM locks WHERE owner = ? ORDER BY created_at ASC, name ASC")
                .bind(owner.to_string())
                .fetch_all(&mut *tx)
                .await?;

        let mut locks = Vec::with_capacity(ids.len());
        for (id,) in ids {
            if let Some(lock) = load_lock(&mut *tx, &id).await? {
                locks.push(lock);
            }
        }
        tx.commit().await?;
        Ok(locks)
    }

    async fn is_name_unique(&self, owner: UserId, name: &str) -> Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM locks WHERE owner = ? AND name_key = ?")
                .bind(owner.to_string())
                .bind(name.to_lowercase())
                .fetch_one(&self.pool)
                .await?;
        Ok(count == 0)
    }

    async fn count_locks_by_type(&self, owner: UserId) -> Result<HashMap<LockType, u32>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT lock_type, COUNT(*) FROM locks WHERE owner = ? GROUP BY lock_type",
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(lock_type, count)| {
                let lock_type = parse_lock_type(&lock_type)?;
                Ok((lock_type, u32::try_from(count).unwrap_or(u32::MAX)))
            })
            .collect()
    }

    async fn create(&self, lock: &Lock) -> Result<()> {
        lock.validate()?;
        let id = lock.id.to_string();
        let mut tx = self.pool.begin().await?;

        for location in &lock.locations {
            if lock_id_at(&mut *tx, location).await?.is_some() {
                return Err(Error::AlreadyLocked);
            }
        }
        if name_holder(&mut *tx, lock.owner, &lock.name_key()).await?.is_some() {
            return Err(Error::NameConflict(lock.name.clone()));
        }

        let (password_hash, salt) = password_columns(lock.password.as_ref());
        sqlx::query(
            r#"
            INSERT INTO locks (id, owner, name, name_key, lock_type, locked_object, password_hash, salt,
                               protect_from_redstone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(lock.owner.to_string())
        .bind(&lock.name)
        .bind(lock.name_key())
        .bind(lock.lock_type.as_str())
        .bind(&lock.locked_object)
        .bind(password_hash)
        .bind(salt)
        .bind(lock.protect_from_redstone)
        .bind(lock.created_at)
        .bind(lock.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, lock))?;

        for (position, location) in lock.locations.iter().enumerate() {
            insert_location(&mut *tx, &id, location, position as i64)
                .await
                .map_err(|e| unique_violation(e, lock))?;
        }
        replace_accessors(&mut *tx, &id, &lock.accessors).await?;

        tx.commit().await.map_err(|e| unique_violation(e, lock))?;
        debug!(lock_id = %lock.id, locations = lock.locations.len(), "Stored lock in SQLite");
        Ok(())
    }

    async fn delete(&self, id: LockId, scope: DeleteScope) -> Result<DeleteOutcome> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;

        let outcome = match scope {
            DeleteScope::Entire => {
                let result = sqlx::query("DELETE FROM locks WHERE id = ?")
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                if result.rows_affected() > 0 {
                    DeleteOutcome::LockRemoved
                } else {
                    DeleteOutcome::Missing
                }
            }
            DeleteScope::Location(location) => {
                let result = sqlx::query(
                    "DELETE FROM lock_locations WHERE lock_id = ? AND world = ? AND x = ? AND y = ? AND z = ?",
                )
                .bind(&id)
                .bind(&location.world)
                .bind(location.x)
                .bind(location.y)
                .bind(location.z)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    DeleteOutcome::Missing
                } else {
                    let (remaining,): (i64,) =
                        sqlx::query_as("SELECT COUNT(*) FROM lock_locations WHERE lock_id = ?")
                            .bind(&id)
                            .fetch_one(&mut *tx)
                            .await?;
                    if remaining == 0 {
                        sqlx::query("DELETE FROM locks WHERE id = ?")
                            .bind(&id)
                            .execute(&mut *tx)
                            .await?;
                        DeleteOutcome::LockRemoved
                    } else {
                        touch(&mut *tx, &id).await?;
                        DeleteOutcome::LocationRemoved
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn add_location(&self, id: LockId, location: &Location) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;

        match lock_id_at(&mut *tx, location).await? {
            Some(existing) if existing == id => return Ok(()),
            Some(_) => return Err(Error::AlreadyLocked),
            None => {}
        }
        ensure_exists(&mut *tx, &id).await?;

        let (next,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM lock_locations WHERE lock_id = ?",
        )
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;
        insert_location(&mut *tx, &id, location, next)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => Error::AlreadyLocked,
                other => other.into(),
            })?;
        touch(&mut *tx, &id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn grant_access(&self, id: LockId, user: UserId) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;
        ensure_exists(&mut *tx, &id).await?;

        // The owner is never stored as an accessor
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO lock_accessors (lock_id, user_id)
            SELECT id, ? FROM locks WHERE id = ? AND owner != ?
            "#,
        )
        .bind(user.to_string())
        .bind(&id)
        .bind(user.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() > 0 {
            touch(&mut *tx, &id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_access(&self, id: LockId, user: UserId) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;
        ensure_exists(&mut *tx, &id).await?;

        let result = sqlx::query("DELETE FROM lock_accessors WHERE lock_id = ? AND user_id = ?")
            .bind(&id)
            .bind(user.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() > 0 {
            touch(&mut *tx, &id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_all_access(&self, id: LockId) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;
        ensure_exists(&mut *tx, &id).await?;

        let result = sqlx::query("DELETE FROM lock_accessors WHERE lock_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() > 0 {
            touch(&mut *tx, &id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_attributes(&self, lock: &Lock) -> Result<()> {
        lock.validate()?;
        let id = lock.id.to_string();
        let mut tx = self.pool.begin().await?;

        if let Some(holder) = name_holder(&mut *tx, lock.owner, &lock.name_key()).await? {
            if holder != id {
                return Err(Error::NameConflict(lock.name.clone()));
            }
        }

        let (password_hash, salt) = password_columns(lock.password.as_ref());
        let result = sqlx::query(
            r#"
            UPDATE locks
            SET owner = ?, name = ?, name_key = ?, lock_type = ?, password_hash = ?, salt = ?,
                protect_from_redstone = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(lock.owner.to_string())
        .bind(&lock.name)
        .bind(lock.name_key())
        .bind(lock.lock_type.as_str())
        .bind(password_hash)
        .bind(salt)
        .bind(lock.protect_from_redstone)
        .bind(lock.updated_at)
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, lock))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        replace_accessors(&mut *tx, &id, &lock.accessors).await?;

        tx.commit().await?;
        Ok(())
    }
}

// ========== Row types ==========

#[derive(Debug, FromRow)]
struct LockRow {
    id: String,
    owner: String,
    name: String,
    lock_type: String,
    locked_object: String,
    password_hash: Option<String>,
    salt: Option<String>,
    protect_from_redstone: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LockRow {
    fn into_lock(self, locations: Vec<Location>, accessors: BTreeSet<UserId>) -> Result<Lock> {
        let password = match (self.password_hash, self.salt) {
            (Some(hash), Some(salt)) => Some(PasswordMaterial { hash, salt }),
            (None, None) => None,
            _ => {
                return Err(Error::Parse(format!(
                    "lock {} has a password hash without a salt",
                    self.id
                )));
            }
        };

        Ok(Lock {
            id: parse_uuid(&self.id)?,
            owner: parse_uuid(&self.owner)?,
            name: self.name,
            lock_type: parse_lock_type(&self.lock_type)?,
            locations,
            accessors,
            password,
            protect_from_redstone: self.protect_from_redstone,
            locked_object: self.locked_object,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Parse(format!("invalid id '{}': {}", value, e)))
}

fn parse_lock_type(value: &str) -> Result<LockType> {
    LockType::from_str(value).ok_or_else(|| Error::Parse(format!("unknown lock type '{}'", value)))
}

fn password_columns(material: Option<&PasswordMaterial>) -> (Option<&str>, Option<&str>) {
    match material {
        Some(material) => (Some(material.hash.as_str()), Some(material.salt.as_str())),
        None => (None, None),
    }
}

/// Map a unique-constraint failure onto the domain error it stands for
fn unique_violation(err: sqlx::Error, lock: &Lock) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            if db.message().contains("lock_locations") {
                Error::AlreadyLocked
            } else {
                Error::NameConflict(lock.name.clone())
            }
        }
        _ => err.into(),
    }
}

// ========== Connection-level helpers ==========

async fn lock_id_at(conn: &mut SqliteConnection, location: &Location) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT lock_id FROM lock_locations WHERE world = ? AND x = ? AND y = ? AND z = ?",
    )
    .bind(&location.world)
    .bind(location.x)
    .bind(location.y)
    .bind(location.z)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|(id,)| id))
}

async fn name_holder(
    conn: &mut SqliteConnection,
    owner: UserId,
    name_key: &str,
) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT id FROM locks WHERE owner = ? AND name_key = ?")
            .bind(owner.to_string())
            .bind(name_key)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(|(id,)| id))
}

async fn ensure_exists(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM locks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|_| ()).ok_or(Error::NotFound)
}

async fn load_lock(conn: &mut SqliteConnection, id: &str) -> Result<Option<Lock>> {
    let query = format!("SELECT {} FROM locks WHERE id = ?", LOCK_COLUMNS);
    let row: Option<LockRow> = sqlx::query_as(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let locations: Vec<(String, i32, i32, i32)> = sqlx::query_as(
        "SELECT world, x, y, z FROM lock_locations WHERE lock_id = ? ORDER BY position ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    let locations = locations
        .into_iter()
        .map(|(world, x, y, z)| Location { world, x, y, z })
        .collect();

    let accessors: Vec<(String,)> =
        sqlx::query_as("SELECT user_id FROM lock_accessors WHERE lock_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
    let accessors = accessors
        .iter()
        .map(|(user,)| parse_uuid(user))
        .collect::<Result<BTreeSet<_>>>()?;

    row.into_lock(locations, accessors).map(Some)
}

async fn insert_location(
    conn: &mut SqliteConnection,
    id: &str,
    location: &Location,
    position: i64,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO lock_locations (world, x, y, z, lock_id, position) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&location.world)
    .bind(location.x)
    .bind(location.y)
    .bind(location.z)
    .bind(id)
    .bind(position)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_accessors(
    conn: &mut SqliteConnection,
    id: &str,
    accessors: &BTreeSet<UserId>,
) -> Result<()> {
    sqlx::query("DELETE FROM lock_accessors WHERE lock_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    for user in accessors {
        sqlx::query("INSERT INTO lock_accessors (lock_id, user_id) VALUES (?, ?)")
            .bind(id)
            .bind(user.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn touch(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("UPDATE locks SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
