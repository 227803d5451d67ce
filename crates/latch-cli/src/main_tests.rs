//! CLI argument parsing tests

use clap::Parser;

use crate::{Cli, Commands, ConfigAction, LockAction, OutputFormat};

#[test]
fn test_format_defaults_to_text() {
    let cli = Cli::try_parse_from(["latch", "config", "show"]).unwrap();
    assert!(cli.format == OutputFormat::Text);
    assert!(cli.db.is_none());
    assert!(matches!(
        cli.command,
        Commands::Config {
            action: ConfigAction::Show
        }
    ));
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "latch", "locks", "show", "world", "1", "2", "3", "--format", "json", "--db", "x.db",
    ])
    .unwrap();
    assert!(cli.format == OutputFormat::Json);
    assert_eq!(cli.db.unwrap().to_str(), Some("x.db"));
}

#[test]
fn test_negative_coordinates() {
    let cli = Cli::try_parse_from(["latch", "locks", "delete", "nether", "-12", "40", "-7"]).unwrap();
    let Commands::Locks {
        action: LockAction::Delete { at },
    } = cli.command
    else {
        panic!("expected locks delete");
    };
    let location = at.location();
    assert_eq!(location.world, "nether");
    assert_eq!((location.x, location.y, location.z), (-12, 40, -7));
}

#[test]
fn test_owner_must_be_a_uuid() {
    assert!(Cli::try_parse_from(["latch", "locks", "list", "--owner", "steve"]).is_err());
    assert!(
        Cli::try_parse_from([
            "latch",
            "locks",
            "list",
            "--owner",
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        ])
        .is_ok()
    );
}
