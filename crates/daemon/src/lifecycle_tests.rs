// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::fs::MetadataExt;
use tempfile::TempDir;

fn paths_in(dir: &TempDir) -> DaemonPaths {
    DaemonPaths::from_home(dir.path().join("mab-home"))
}

#[test]
fn acquire_creates_home_with_owner_only_mode() {
    let dir = TempDir::new().unwrap();
    let paths = paths_in(&dir);
    let guard = acquire(&paths).unwrap();

    let mode = std::fs::metadata(&paths.home).unwrap().mode() & 0o777;
    assert_eq!(mode, 0o700);

    let pid: u32 = std::fs::read_to_string(&paths.pid_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());
    assert_eq!(read_pid_file(&paths), Some(pid));
    drop(guard);
}

#[test]
fn second_acquire_fails_while_lock_held() {
    let dir = TempDir::new().unwrap();
    let paths = paths_in(&dir);
    let guard = acquire(&paths).unwrap();

    match acquire(&paths) {
        Err(LifecycleError::LockFailed(_)) => {}
        other => panic!("expected LockFailed, got {other:?}"),
    }

    // Lock released on drop; re-acquire succeeds
    drop(guard);
    acquire(&paths).unwrap();
}

#[test]
fn cleanup_removes_pid_and_socket() {
    let dir = TempDir::new().unwrap();
    let paths = paths_in(&dir);
    let guard = acquire(&paths).unwrap();
    std::fs::write(&paths.socket_path, b"").unwrap();

    guard.cleanup();
    assert!(!paths.pid_path.exists());
    assert!(!paths.socket_path.exists());
    // Lock file stays; only the flock matters
    assert!(paths.lock_path.exists());
}

#[tokio::test]
async fn bind_socket_sets_owner_only_mode_and_replaces_stale() {
    let dir = TempDir::new().unwrap();
    let paths = paths_in(&dir);
    let _guard = acquire(&paths).unwrap();

    // Stale file from a crashed daemon
    std::fs::write(&paths.socket_path, b"stale").unwrap();

    let _listener = bind_socket(&paths).unwrap();
    let mode = std::fs::metadata(&paths.socket_path).unwrap().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[test]
fn open_store_creates_database() {
    let dir = TempDir::new().unwrap();
    let paths = paths_in(&dir);
    let _guard = acquire(&paths).unwrap();
    let store = open_store(&paths).unwrap();
    assert_eq!(store.schema_version().unwrap(), 1);
    assert!(paths.db_path.exists());
}
