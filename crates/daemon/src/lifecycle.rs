// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: home layout, single-instance lock, socket bind.
//!
//! The lock is acquired first and held for the daemon's lifetime; every
//! other file under the home (pid, socket) is only touched while holding
//! it, so stale files from a crashed daemon are safe to remove.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use mab_storage::{Store, StoreError};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::warn;

/// File layout under the mab home directory.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub home: PathBuf,
    pub pid_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub socket_path: PathBuf,
    pub db_path: PathBuf,
}

impl DaemonPaths {
    pub fn resolve() -> Result<Self, LifecycleError> {
        Ok(Self::from_home(crate::env::mab_home()?))
    }

    pub fn from_home(home: PathBuf) -> Self {
        Self {
            pid_path: home.join("daemon.pid"),
            lock_path: home.join("daemon.lock"),
            log_path: home.join("daemon.log"),
            socket_path: home.join("mab.sock"),
            db_path: home.join("workers.db"),
            home,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine home directory")]
    NoHome,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds the exclusive lock plus the files to remove on exit.
#[derive(Debug)]
pub struct StartupGuard {
    // NOTE(lifetime): held to maintain the exclusive flock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    paths: DaemonPaths,
}

impl StartupGuard {
    /// Remove the pid file and socket. The flock itself releases when the
    /// guard drops.
    pub fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.paths.socket_path);
        let _ = std::fs::remove_file(&self.paths.pid_path);
    }
}

/// Create the home (0700), take the exclusive lock, write the pid file.
pub fn acquire(paths: &DaemonPaths) -> Result<StartupGuard, LifecycleError> {
    if !paths.home.exists() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&paths.home)?;
    }

    // Open without truncating: the file may belong to a running daemon
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let mut pid_file = File::create(&paths.pid_path)?;
    write!(pid_file, "{}", std::process::id())?;

    warn_if_network_home(&paths.home);

    Ok(StartupGuard {
        lock_file,
        paths: paths.clone(),
    })
}

/// Open the worker store; corruption is fatal and surfaces as-is.
pub fn open_store(paths: &DaemonPaths) -> Result<Store, LifecycleError> {
    Ok(Store::open(&paths.db_path)?)
}

/// Bind the RPC socket (mode 0600). A stale socket file is safe to unlink
/// because we already hold the exclusive lock.
pub fn bind_socket(paths: &DaemonPaths) -> Result<UnixListener, LifecycleError> {
    if paths.socket_path.exists() {
        std::fs::remove_file(&paths.socket_path)?;
    }
    let listener = UnixListener::bind(&paths.socket_path)
        .map_err(|e| LifecycleError::BindFailed(paths.socket_path.clone(), e))?;
    std::fs::set_permissions(
        &paths.socket_path,
        std::fs::Permissions::from_mode(0o600),
    )?;
    Ok(listener)
}

/// Advisory file locks are unreliable across hosts on network filesystems;
/// warn loudly and continue.
#[cfg(target_os = "linux")]
fn warn_if_network_home(home: &Path) {
    use nix::sys::statfs::{statfs, NFS_SUPER_MAGIC, SMB_SUPER_MAGIC};

    let Ok(fs) = statfs(home) else { return };
    let fs_type = fs.filesystem_type();
    if fs_type == NFS_SUPER_MAGIC || fs_type == SMB_SUPER_MAGIC {
        warn!(
            home = %home.display(),
            "home directory is on a network filesystem (NFS/SMB); \
             the single-instance lock is not reliable across hosts"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn warn_if_network_home(_home: &Path) {}

/// Read the pid recorded by a (possibly dead) daemon.
pub fn read_pid_file(paths: &DaemonPaths) -> Option<u32> {
    let text = std::fs::read_to_string(&paths.pid_path).ok()?;
    text.trim().parse().ok()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
