//! CLI integration tests for latch
//!
//! Tests the latch CLI commands end-to-end using assert_cmd.

use std::path::Path;
use std::sync::Arc;

use assert_cmd::Command;
use latch_core::domain::{
    CreateLock, Interaction, Location, LockManager, LockSettings, SqliteLockRepository, Target,
};
use latch_core::storage::{Database, DatabaseConfig};
use predicates::prelude::*;
use tempfile::TempDir;
use uuid::Uuid;

/// Command isolated from the user's real config directory
#[allow(deprecated)]
fn latch_cmd(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("latch").unwrap();
    cmd.env("LATCH_CONFIG_DIR", config_dir);
    cmd.env("RUST_LOG", "error");
    cmd
}

/// Create a paired chest lock named `name` at world(0..1, 64, 0)
fn seed_lock(db_path: &Path, owner: Uuid, name: &str) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let db = Database::new(DatabaseConfig::with_path(db_path)).await.unwrap();
        let manager = LockManager::new(
            Arc::new(SqliteLockRepository::new(db.pool().clone())),
            LockSettings::new().with_lockable(["minecraft:chest"]),
        );
        let target = Target::new(Location::new("world", 0, 64, 0), "minecraft:chest")
            .with_partner(Location::new("world", 1, 64, 0));
        manager
            .apply_interaction(owner, &Interaction::Create(CreateLock::new().with_name(name)), &target)
            .await
            .unwrap();
        db.close().await;
    });
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    latch_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("locks"));
}

#[test]
fn test_config_path_honors_env() {
    let dir = TempDir::new().unwrap();
    latch_cmd(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("latch.toml"))
        .stdout(predicate::str::contains(dir.path().to_str().unwrap()));
}

#[test]
fn test_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    latch_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("minecraft:chest"));
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    let output = latch_cmd(dir.path())
        .args(["config", "show", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["protect_from_redstone"], false);
    assert!(value["lockable_blocks"].as_array().unwrap().len() > 1);
}

#[test]
fn test_config_check_valid_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("latch.toml"),
        "lockable_blocks = [\"minecraft:barrel\"]\n[lock_limit]\ntotal = 5\n",
    )
    .unwrap();

    latch_cmd(dir.path())
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Configuration: Valid"));
}

#[test]
fn test_config_check_reports_issues() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("latch.toml"),
        "protect_from_redstone = \"yes\"\n[lock_limit]\ntotal = \"many\"\n",
    )
    .unwrap();

    latch_cmd(dir.path())
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("protect_from_redstone"))
        .stdout(predicate::str::contains("lock_limit.total"))
        .stderr(predicate::str::contains("configuration issue(s) found"));
}

#[test]
fn test_locks_list_empty_store() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("locks.db");
    let owner = Uuid::new_v4();

    latch_cmd(dir.path())
        .args(["locks", "list", "--owner", &owner.to_string()])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("No locks owned by"));
}

#[test]
fn test_locks_show_and_list() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("locks.db");
    let owner = Uuid::new_v4();
    seed_lock(&db, owner, "Storage");

    latch_cmd(dir.path())
        .args(["locks", "show", "world", "1", "64", "0"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Lock: Storage"))
        .stdout(predicate::str::contains("world(0, 64, 0)"))
        .stdout(predicate::str::contains("world(1, 64, 0)"));

    let output = latch_cmd(dir.path())
        .args(["locks", "list", "--owner", &owner.to_string(), "--format", "json"])
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let locks = value.as_array().unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0]["name"], "Storage");
    assert_eq!(locks[0]["has_password"], false);
}

#[test]
fn test_locks_show_missing() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("locks.db");

    latch_cmd(dir.path())
        .args(["locks", "show", "world", "5", "5", "5"])
        .arg("--db")
        .arg(&db)
        .assert()
        .failure()
        .stderr(predicate::str::contains("There is no lock at"));
}

#[test]
fn test_locks_delete_cascades() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("locks.db");
    let owner = Uuid::new_v4();
    seed_lock(&db, owner, "Doomed");

    latch_cmd(dir.path())
        .args(["locks", "delete", "world", "0", "64", "0"])
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted lock 'Doomed'"));

    latch_cmd(dir.path())
        .args(["locks", "show", "world", "1", "64", "0"])
        .arg("--db")
        .arg(&db)
        .assert()
        .failure();

    latch_cmd(dir.path())
        .args(["locks", "delete", "world", "0", "64", "0"])
        .arg("--db")
        .arg(&db)
        .assert()
        .failure();
}
