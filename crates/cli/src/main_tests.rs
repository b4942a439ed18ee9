// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[test]
fn parses_spawn_with_options() {
    let cli = Cli::parse_from([
        "mab",
        "spawn",
        "developer",
        "--town",
        "/projects/a",
        "--instance",
        "2",
        "--no-auto-restart",
    ]);
    match cli.command {
        Commands::Spawn {
            role,
            town,
            instance,
            no_auto_restart,
        } => {
            assert_eq!(role, "developer");
            assert_eq!(town.as_deref(), Some("/projects/a"));
            assert_eq!(instance, Some(2));
            assert!(no_auto_restart);
        }
        _ => panic!("expected spawn"),
    }
}

#[test]
fn parses_stop_flags() {
    let cli = Cli::parse_from(["mab", "stop", "worker-qa-abc", "--force", "--timeout", "3"]);
    match cli.command {
        Commands::Stop {
            worker_id,
            force,
            timeout,
        } => {
            assert_eq!(worker_id, "worker-qa-abc");
            assert!(force);
            assert_eq!(timeout, Some(3));
        }
        _ => panic!("expected stop"),
    }
}

#[test]
fn parses_town_subcommands() {
    let cli = Cli::parse_from(["mab", "town", "create", "alpha", "/projects/a"]);
    match cli.command {
        Commands::Town {
            command: TownCommands::Create { name, path },
        } => {
            assert_eq!(name, "alpha");
            assert_eq!(path, "/projects/a");
        }
        _ => panic!("expected town create"),
    }

    let cli = Cli::parse_from(["mab", "town", "delete", "alpha", "--force"]);
    assert!(matches!(
        cli.command,
        Commands::Town {
            command: TownCommands::Delete { force: true, .. }
        }
    ));
}

#[test]
fn global_home_flag_applies() {
    let cli = Cli::parse_from(["mab", "--home", "/tmp/mh", "status"]);
    assert_eq!(cli.home, Some(PathBuf::from("/tmp/mh")));
    assert_eq!(mab_home(&cli.home).unwrap(), PathBuf::from("/tmp/mh"));
}

#[test]
fn rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["mab", "frobnicate"]).is_err());
}
