// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;
use tempfile::TempDir;

fn yaml(s: &str) -> Value {
    serde_yaml::from_str(s).unwrap()
}

#[test]
fn defaults_match_documented_values() {
    let config = MabConfig::default();
    assert_eq!(config.max_workers_per_town, 5);
    assert!(config.auto_create_town);
    assert_eq!(config.health_check.interval_seconds, 10);
    assert_eq!(config.health_check.heartbeat_timeout_seconds, 30);
    assert_eq!(config.health_check.unhealthy_threshold, 3);
    assert!(config.restart_policy.enabled);
    assert_eq!(config.restart_policy.max_restarts, 5);
    assert_eq!(config.restart_policy.backoff_base_seconds, 5);
    assert_eq!(config.restart_policy.backoff_max_seconds, 300);
    assert_eq!(config.restart_policy.cooldown_seconds, 3600);
    assert_eq!(config.shutdown.worker_grace_seconds, 60);
    assert_eq!(config.shutdown.force_kill_timeout_seconds, 10);
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn scalars_replace() {
    let mut config = MabConfig::default();
    config.apply(&yaml("max_workers_per_town: 2\nauto_create_town: false"));
    assert_eq!(config.max_workers_per_town, 2);
    assert!(!config.auto_create_town);
}

#[test]
fn sections_merge_shallowly() {
    let mut config = MabConfig::default();
    config.apply(&yaml("health_check:\n  interval_seconds: 1"));
    // Only the named key changed; siblings keep their previous values
    assert_eq!(config.health_check.interval_seconds, 1);
    assert_eq!(config.health_check.heartbeat_timeout_seconds, 30);
    assert_eq!(config.health_check.unhealthy_threshold, 3);
}

#[test]
fn lists_replace_wholesale() {
    let mut config = MabConfig::default();
    assert_eq!(config.default_roles.len(), 2);
    config.apply(&yaml("default_roles: [reviewer]"));
    assert_eq!(config.default_roles, vec![WorkerRole::Reviewer]);
}

#[test]
fn unknown_keys_are_ignored() {
    let mut config = MabConfig::default();
    config.apply(&yaml("frobnicate: true\nhealth_check:\n  color: red"));
    assert_eq!(config, MabConfig::default());
}

#[test]
fn later_layers_win() {
    let mut config = MabConfig::default();
    config.apply(&yaml("max_workers_per_town: 10"));
    config.apply(&yaml("max_workers_per_town: 3"));
    assert_eq!(config.max_workers_per_town, 3);
}

#[test]
fn resolver_layers_global_then_project_then_town_overrides() {
    let home = TempDir::new().unwrap();
    let town = TempDir::new().unwrap();
    fs::write(
        home.path().join("config.yaml"),
        "max_workers_per_town: 9\nrestart_policy:\n  max_restarts: 2\n",
    )
    .unwrap();
    fs::create_dir_all(town.path().join(".mab")).unwrap();
    fs::write(
        town.path().join(".mab/config.yaml"),
        "max_workers_per_town: 4\n",
    )
    .unwrap();

    let resolver = ConfigResolver::new(home.path());

    // Global only
    let global = resolver.effective(None, None);
    assert_eq!(global.max_workers_per_town, 9);
    assert_eq!(global.restart_policy.max_restarts, 2);

    // Project override wins on its key, inherits the rest
    let project = resolver.effective(Some(town.path()), None);
    assert_eq!(project.max_workers_per_town, 4);
    assert_eq!(project.restart_policy.max_restarts, 2);

    // Town-record overrides sit above the project file
    let overrides = serde_json::json!({ "max_workers_per_town": 1 });
    let with_overrides = resolver.effective(Some(town.path()), Some(&overrides));
    assert_eq!(with_overrides.max_workers_per_town, 1);
}

#[test]
fn missing_files_fall_back_to_defaults() {
    let home = TempDir::new().unwrap();
    let resolver = ConfigResolver::new(home.path());
    assert_eq!(resolver.effective(None, None), MabConfig::default());
    assert!(resolver.check().is_ok());
}

#[test]
fn check_reports_parse_errors() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("config.yaml"), ": not yaml :\n  - [").unwrap();
    let resolver = ConfigResolver::new(home.path());
    assert!(matches!(resolver.check(), Err(ConfigError::Parse { .. })));
    // effective() tolerates the broken file
    assert_eq!(resolver.effective(None, None), MabConfig::default());
}

#[test]
fn log_level_parses() {
    assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
    assert!("verbose".parse::<LogLevel>().is_err());
    let mut config = MabConfig::default();
    config.apply(&yaml("log_level: warn"));
    assert_eq!(config.log_level, LogLevel::Warn);
}
