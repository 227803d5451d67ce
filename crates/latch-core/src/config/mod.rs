//! Configuration loading with file persistence
//!
//! Loading is tolerant of bad entries: every key is read on its own, a
//! malformed key or list element is reported as a [`ConfigIssue`] and
//! replaced by its default, and the rest of the file still applies. Only a
//! file that exists but cannot be read fails the load.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

use crate::domain::credentials::{CredentialCodec, HashingParams};
use crate::domain::limits::LimitTable;
use crate::domain::lock::LockType;
use crate::domain::manager::LockSettings;
use crate::error::Error;
use crate::storage::default_database_path;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "LATCH_CONFIG_DIR";

const CONFIG_FILE: &str = "latch.toml";

/// Latch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatchConfig {
    /// Resource kinds that may be locked
    pub lockable_blocks: Vec<String>,
    /// Kinds that may not be placed next to a lock the placer cannot access
    pub prevent_adjacent_to_locks: Vec<String>,
    /// Kinds whose lock also guards the block below
    pub protect_below_block: Vec<String>,
    /// Bucket -> limit; negative means unlimited
    pub lock_limit: BTreeMap<String, i64>,
    /// Lock type -> bucket overrides
    pub lock_buckets: BTreeMap<String, String>,
    /// Default interference protection for new locks
    pub protect_from_redstone: bool,
    pub password_hashing: HashingParams,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file; the platform data directory when unset
    pub database_path: Option<PathBuf>,
}

impl Default for LatchConfig {
    fn default() -> Self {
        let kinds = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        Self {
            lockable_blocks: kinds(&[
                "minecraft:chest",
                "minecraft:trapped_chest",
                "minecraft:barrel",
                "minecraft:furnace",
                "minecraft:dispenser",
                "minecraft:dropper",
                "minecraft:jukebox",
                "minecraft:oak_door",
                "minecraft:iron_door",
                "minecraft:oak_trapdoor",
                "minecraft:oak_fence_gate",
            ]),
            prevent_adjacent_to_locks: kinds(&["minecraft:hopper"]),
            protect_below_block: kinds(&["minecraft:oak_door", "minecraft:iron_door"]),
            lock_limit: BTreeMap::from([("total".to_string(), -1)]),
            lock_buckets: BTreeMap::new(),
            protect_from_redstone: false,
            password_hashing: HashingParams::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// A configuration entry that was ignored during loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Dotted key path, e.g. `lock_limit.owner_only`
    pub key: String,
    pub message: String,
}

impl ConfigIssue {
    fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl From<ConfigIssue> for Error {
    fn from(issue: ConfigIssue) -> Self {
        Error::InvalidConfiguration(issue.to_string())
    }
}

/// Result of loading a configuration file
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LatchConfig,
    pub issues: Vec<ConfigIssue>,
    /// The file read, if one existed
    pub source: Option<PathBuf>,
}

impl LatchConfig {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("latch")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from the default location; defaults when no file exists
    pub fn load() -> anyhow::Result<LoadedConfig> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; defaults when the file does not exist
    pub fn load_from(path: &Path) -> anyhow::Result<LoadedConfig> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(LoadedConfig {
                config: Self::default(),
                issues: Vec::new(),
                source: None,
            });
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let (config, issues) = Self::parse(&contents);
        for issue in &issues {
            tracing::error!(path = %path.display(), key = %issue.key, "Invalid configuration: {}", issue.message);
        }

        Ok(LoadedConfig {
            config,
            issues,
            source: Some(path.to_path_buf()),
        })
    }

    /// Parse TOML text, collecting issues instead of failing
    pub fn parse(contents: &str) -> (Self, Vec<ConfigIssue>) {
        let mut config = Self::default();
        let mut issues = Vec::new();

        let table: Table = match contents.parse() {
            Ok(table) => table,
            Err(e) => {
                issues.push(ConfigIssue::new("<file>", format!("not valid TOML: {}", e)));
                return (config, issues);
            }
        };

        let mut reader = Reader {
            table: &table,
            issues: &mut issues,
        };
        if let Some(kinds) = reader.string_list("lockable_blocks") {
            config.lockable_blocks = kinds;
        }
        if let Some(kinds) = reader.string_list("prevent_adjacent_to_locks") {
            config.prevent_adjacent_to_locks = kinds;
        }
        if let Some(kinds) = reader.string_list("protect_below_block") {
            config.protect_below_block = kinds;
        }
        if let Some(limits) = reader.lock_limits() {
            config.lock_limit = limits;
        }
        if let Some(buckets) = reader.lock_buckets() {
            config.lock_buckets = buckets;
        }
        if let Some(protect) = reader.boolean("protect_from_redstone") {
            config.protect_from_redstone = protect;
        }
        config.password_hashing = reader.hashing_params();
        if let Some(path) = reader.database_path() {
            config.storage.database_path = Some(path);
        }

        (config, issues)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// The limit table these settings describe
    pub fn limit_table(&self) -> LimitTable {
        let mut table = LimitTable::from_limits(
            self.lock_limit
                .iter()
                .map(|(bucket, limit)| (bucket.as_str(), *limit)),
        );
        for (lock_type, bucket) in &self.lock_buckets {
            match LockType::from_str(lock_type) {
                Some(lock_type) => table.set_bucket(lock_type, bucket),
                None => tracing::warn!(lock_type = %lock_type, "Ignoring bucket for unknown lock type"),
            }
        }
        table
    }

    /// Settings snapshot for the lock manager
    pub fn to_settings(&self) -> LockSettings {
        LockSettings::new()
            .with_lockable(&self.lockable_blocks)
            .with_restricted(&self.prevent_adjacent_to_locks)
            .with_protect_below(&self.protect_below_block)
            .with_limits(self.limit_table())
            .with_protect_from_redstone(self.protect_from_redstone)
    }

    /// Credential codec with the configured hashing costs
    pub fn credential_codec(&self) -> crate::Result<CredentialCodec> {
        CredentialCodec::new(self.password_hashing)
    }

    /// SQLite file to use for the lock store
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Reads single keys out of a parsed table, recording what it skips
struct Reader<'a> {
    table: &'a Table,
    issues: &'a mut Vec<ConfigIssue>,
}

impl<'a> Reader<'a> {
    fn value(&self, key: &str) -> Option<&'a Value> {
        let table: &'a Table = self.table;
        table.get(key)
    }

    fn issue(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ConfigIssue::new(key, message));
    }

    fn string_list(&mut self, key: &str) -> Option<Vec<String>> {
        let value = self.value(key)?;
        let Some(items) = value.as_array() else {
            self.issue(key, format!("expected a list of strings, found {}", value.type_str()));
            return None;
        };

        let mut kinds = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(kind) if !kind.trim().is_empty() => kinds.push(kind.to_string()),
                Some(_) => self.issue(format!("{}[{}]", key, i), "empty entry"),
                None => self.issue(
                    format!("{}[{}]", key, i),
                    format!("expected a string, found {}", item.type_str()),
                ),
            }
        }
        Some(kinds)
    }

    fn boolean(&mut self, key: &str) -> Option<bool> {
        let value = self.value(key)?;
        let flag = value.as_bool();
        if flag.is_none() {
            self.issue(key, format!("expected true or false, found {}", value.type_str()));
        }
        flag
    }

    fn sub_table(&mut self, key: &str) -> Option<&'a Table> {
        let value = self.value(key)?;
        let sub = value.as_table();
        if sub.is_none() {
            self.issue(key, format!("expected a table, found {}", value.type_str()));
        }
        sub
    }

    fn lock_limits(&mut self) -> Option<BTreeMap<String, i64>> {
        let table = self.sub_table("lock_limit")?;
        let mut limits = BTreeMap::new();
        for (bucket, value) in table {
            match value.as_integer() {
                Some(limit) => {
                    limits.insert(bucket.to_lowercase(), limit);
                }
                None => self.issue(
                    format!("lock_limit.{}", bucket),
                    format!("expected an integer, found {}", value.type_str()),
                ),
            }
        }
        Some(limits)
    }

    fn lock_buckets(&mut self) -> Option<BTreeMap<String, String>> {
        let table = self.sub_table("lock_buckets")?;
        let mut buckets = BTreeMap::new();
        for (lock_type, value) in table {
            let key = format!("lock_buckets.{}", lock_type);
            let Some(parsed) = LockType::from_str(lock_type) else {
                self.issue(key, "unknown lock type");
                continue;
            };
            match value.as_str() {
                Some(bucket) if !bucket.trim().is_empty() => {
                    buckets.insert(parsed.as_str().to_string(), bucket.to_lowercase());
                }
                _ => self.issue(key, "expected a bucket name"),
            }
        }
        Some(buckets)
    }

    fn hashing_params(&mut self) -> HashingParams {
        let defaults = HashingParams::default();
        let Some(table) = self.sub_table("password_hashing") else {
            return defaults;
        };

        let mut field = |name: &str, default: u32| -> u32 {
            let Some(value) = table.get(name) else {
                return default;
            };
            match value.as_integer().and_then(|v| u32::try_from(v).ok()) {
                Some(v) => v,
                None => {
                    self.issues.push(ConfigIssue::new(
                        format!("password_hashing.{}", name),
                        "expected a non-negative integer",
                    ));
                    default
                }
            }
        };
        let params = HashingParams {
            memory_kib: field("memory_kib", defaults.memory_kib),
            iterations: field("iterations", defaults.iterations),
            parallelism: field("parallelism", defaults.parallelism),
        };

        match CredentialCodec::new(params) {
            Ok(_) => params,
            Err(e) => {
                self.issue("password_hashing", e.to_string());
                defaults
            }
        }
    }

    fn database_path(&mut self) -> Option<PathBuf> {
        let storage = self.sub_table("storage")?;
        let value = storage.get("database_path")?;
        match value.as_str() {
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => {
                self.issue("storage.database_path", "expected a file path");
                None
            }
        }
    }
}
