// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the mab home directory: MAB_HOME > ~/.mab
pub fn mab_home() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("MAB_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoHome)?;
    Ok(PathBuf::from(home).join(".mab"))
}

/// Log level override, e.g. `MAB_LOG=debug`
pub fn log_override() -> Option<String> {
    std::env::var("MAB_LOG").ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
