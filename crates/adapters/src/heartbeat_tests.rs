// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[test]
fn paths_follow_town_layout() {
    let id = WorkerId::new("worker-qa-abc123de");
    let hb = heartbeat_path(Path::new("/projects/a"), &id);
    assert_eq!(
        hb,
        PathBuf::from("/projects/a/.mab/heartbeat/worker-qa-abc123de")
    );
    let log = log_path(Path::new("/projects/a"), &id);
    assert_eq!(
        log,
        PathBuf::from("/projects/a/.mab/logs/worker-qa-abc123de.log")
    );
}

#[test]
fn age_is_none_without_a_file() {
    let dir = TempDir::new().unwrap();
    assert_eq!(age_ms(&dir.path().join("missing"), 10_000), None);
}

#[test]
fn age_tracks_mtime() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hb");
    std::fs::File::create(&path).unwrap();

    let mtime = mtime_ms(&path).unwrap();
    assert_eq!(age_ms(&path, mtime + 1_500), Some(1_500));
    // Future mtime (clock skew) saturates to zero rather than wrapping
    assert_eq!(age_ms(&path, mtime.saturating_sub(5_000)), Some(0));
}

#[test]
fn remove_is_silent_on_missing_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hb");
    std::fs::File::create(&path).unwrap();
    remove(&path);
    assert!(!path.exists());
    remove(&path);
}
