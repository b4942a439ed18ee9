// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn mab_home_prefers_env_override() {
    std::env::set_var("MAB_HOME", "/tmp/custom-mab");
    assert_eq!(mab_home().unwrap(), PathBuf::from("/tmp/custom-mab"));
    std::env::remove_var("MAB_HOME");
}

#[test]
#[serial]
fn mab_home_defaults_under_home() {
    std::env::remove_var("MAB_HOME");
    std::env::set_var("HOME", "/home/someone");
    assert_eq!(mab_home().unwrap(), PathBuf::from("/home/someone/.mab"));
}

#[test]
#[serial]
fn log_override_ignores_empty() {
    std::env::set_var("MAB_LOG", "");
    assert_eq!(log_override(), None);
    std::env::set_var("MAB_LOG", "debug");
    assert_eq!(log_override(), Some("debug".to_string()));
    std::env::remove_var("MAB_LOG");
}
