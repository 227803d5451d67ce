//! Latch CLI - inspect and administer a lock store

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use latch_core::config::{LatchConfig, LoadedConfig};
use latch_core::domain::{DeleteOutcome, Location, Lock, LockManager, SqliteLockRepository};
use latch_core::storage::{Database, DatabaseConfig};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "latch")]
#[command(author, version, about = "Resource locking and access control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Lock database file (defaults to storage.database_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect and remove locks
    Locks {
        #[command(subcommand)]
        action: LockAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the config file and report problems
    Check,
    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum LockAction {
    /// List locks owned by a user
    List {
        #[arg(long)]
        owner: Uuid,
    },
    /// Show the lock at a location
    Show {
        #[command(flatten)]
        at: LocationArgs,
    },
    /// Delete the lock at a location, including every paired location
    Delete {
        #[command(flatten)]
        at: LocationArgs,
    },
}

#[derive(clap::Args)]
struct LocationArgs {
    world: String,
    #[arg(allow_negative_numbers = true)]
    x: i32,
    #[arg(allow_negative_numbers = true)]
    y: i32,
    #[arg(allow_negative_numbers = true)]
    z: i32,
}

impl LocationArgs {
    fn location(&self) -> Location {
        Location::new(&self.world, self.x, self.y, self.z)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("latch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => cmd_config(action, cli.format),
        Commands::Locks { action } => {
            let loaded = LatchConfig::load()?;
            let manager = open_manager(&loaded.config, cli.db).await?;
            cmd_locks(&manager, action, cli.format).await
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn cmd_config(action: ConfigAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let loaded = LatchConfig::load()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&loaded.config)?)
                }
                OutputFormat::Text => {
                    print_source(&loaded);
                    print!("{}", loaded.config.to_toml()?);
                }
            }
        }
        ConfigAction::Check => {
            let loaded = LatchConfig::load()?;
            match format {
                OutputFormat::Json => {
                    let issues: Vec<_> = loaded
                        .issues
                        .iter()
                        .map(|i| json!({ "key": i.key, "message": i.message }))
                        .collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "source": loaded.source,
                            "valid": issues.is_empty(),
                            "issues": issues,
                        }))?
                    );
                }
                OutputFormat::Text => {
                    print_source(&loaded);
                    if loaded.issues.is_empty() {
                        println!("[OK] Configuration: Valid");
                    }
                    for issue in &loaded.issues {
                        println!("[!!] {}", issue);
                    }
                }
            }
            if !loaded.issues.is_empty() {
                anyhow::bail!("{} configuration issue(s) found", loaded.issues.len());
            }
        }
        ConfigAction::Path => {
            let path = LatchConfig::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn print_source(loaded: &LoadedConfig) {
    match &loaded.source {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file, using defaults"),
    }
}

async fn open_manager(config: &LatchConfig, db: Option<PathBuf>) -> anyhow::Result<LockManager> {
    let path = db.unwrap_or_else(|| config.database_path());
    let database = Database::new(DatabaseConfig::with_path(&path))
        .await
        .with_context(|| format!("Failed to open lock store at {}", path.display()))?;
    info!(path = %path.display(), "Lock store opened");

    let repository = Arc::new(SqliteLockRepository::new(database.pool().clone()));
    Ok(LockManager::new(repository, config.to_settings()).with_codec(config.credential_codec()?))
}

async fn cmd_locks(
    manager: &LockManager,
    action: LockAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        LockAction::List { owner } => {
            let locks = manager.players_locks(owner).await?;
            match format {
                OutputFormat::Json => {
                    let locks: Vec<_> = locks.iter().map(lock_json).collect();
                    println!("{}", serde_json::to_string_pretty(&locks)?);
                }
                OutputFormat::Text if locks.is_empty() => {
                    println!("No locks owned by {}.", owner);
                }
                OutputFormat::Text => {
                    println!("Locks owned by {}:", owner);
                    for lock in &locks {
                        let first = lock
                            .locations
                            .first()
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        println!("  {} - {} [{}] at {}", lock.id, lock.name, lock.lock_type, first);
                    }
                }
            }
        }
        LockAction::Show { at } => {
            let location = at.location();
            let lock = manager
                .get_lock(&location)
                .await?
                .ok_or_else(|| anyhow::anyhow!("There is no lock at {}.", location))?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&lock_json(&lock))?)
                }
                OutputFormat::Text => print_lock(&lock),
            }
        }
        LockAction::Delete { at } => {
            let location = at.location();
            let lock = manager.get_lock(&location).await?;
            if manager.delete_lock(&location, true).await? == DeleteOutcome::Missing {
                anyhow::bail!("There is no lock at {}.", location);
            }
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "deleted": true,
                        "lock": lock.as_ref().map(lock_json),
                    }))?
                ),
                OutputFormat::Text => match lock {
                    Some(lock) => println!("Deleted lock '{}' ({}).", lock.name, lock.id),
                    None => println!("Deleted lock at {}.", location),
                },
            }
        }
    }
    Ok(())
}

/// JSON view of a lock without its password material
fn lock_json(lock: &Lock) -> serde_json::Value {
    json!({
        "id": lock.id,
        "owner": lock.owner,
        "name": lock.name,
        "type": lock.lock_type.as_str(),
        "locked_object": lock.locked_object,
        "locations": lock.locations.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "accessors": lock.accessors,
        "has_password": lock.password.is_some(),
        "protect_from_redstone": lock.protect_from_redstone,
        "created_at": lock.created_at,
        "updated_at": lock.updated_at,
    })
}

fn print_lock(lock: &Lock) {
    println!("Lock: {}", lock.name);
    println!("  ID: {}", lock.id);
    println!("  Owner: {}", lock.owner);
    println!("  Type: {}", lock.lock_type);
    println!("  Object: {}", lock.locked_object);
    for location in &lock.locations {
        println!("  Location: {}", location);
    }
    if !lock.accessors.is_empty() {
        println!("  Accessors:");
        for user in &lock.accessors {
            println!("    {}", user);
        }
    }
    println!(
        "  Redstone protection: {}",
        if lock.protect_from_redstone { "on" } else { "off" }
    );
    println!("  Created: {}", lock.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated: {}", lock.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

#[cfg(test)]
mod main_tests;
