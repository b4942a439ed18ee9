// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat files.
//!
//! A heartbeat is an empty file under `<town>/.mab/heartbeat/<worker_id>`;
//! the modification time carries the signal. Workers write it, the daemon
//! only reads.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use mab_core::WorkerId;

/// Heartbeat file path for a worker in a town.
pub fn heartbeat_path(town_path: &Path, worker_id: &WorkerId) -> PathBuf {
    town_path
        .join(".mab")
        .join("heartbeat")
        .join(worker_id.as_str())
}

/// Worker log path for a worker in a town.
pub fn log_path(town_path: &Path, worker_id: &WorkerId) -> PathBuf {
    town_path
        .join(".mab")
        .join("logs")
        .join(format!("{worker_id}.log"))
}

/// Modification time in epoch milliseconds, `None` when the file is absent.
pub fn mtime_ms(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(
        modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64,
    )
}

/// Heartbeat age relative to `now_ms`, `None` when no heartbeat exists.
///
/// A modification time in the future (clock skew) reads as age zero.
pub fn age_ms(path: &Path, now_ms: u64) -> Option<u64> {
    mtime_ms(path).map(|mtime| now_ms.saturating_sub(mtime))
}

/// Best-effort removal, used when a worker record goes terminal.
pub fn remove(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
