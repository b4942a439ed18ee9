// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess management for agent workers.
//!
//! The daemon owns children it spawned (exit codes observable via the kept
//! `Child` handle) but must also probe pids it merely re-attached to after a
//! restart; those only support existence checks via `kill(pid, 0)`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use mab_core::{WorkerId, WorkerRole};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::debug;

/// Everything needed to launch one agent process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub worker_id: WorkerId,
    pub role: WorkerRole,
    /// Working directory for the child (the town path).
    pub town_path: PathBuf,
    /// Stdout + stderr are appended here.
    pub log_path: PathBuf,
    /// File the agent touches to prove liveness.
    pub heartbeat_path: PathBuf,
    /// Role prompt handed to the agent.
    pub prompt_path: PathBuf,
    /// Program + leading args.
    pub command: Vec<String>,
}

impl SpawnSpec {
    /// Environment contract the agent reads at startup.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("WORKER_ID".into(), self.worker_id.to_string()),
            ("WORKER_ROLE".into(), self.role.to_string()),
            (
                "WORKER_TOWN".into(),
                self.town_path.to_string_lossy().into_owned(),
            ),
            (
                "WORKER_HEARTBEAT_FILE".into(),
                self.heartbeat_path.to_string_lossy().into_owned(),
            ),
            (
                "WORKER_PROMPT_FILE".into(),
                self.prompt_path.to_string_lossy().into_owned(),
            ),
        ]
    }
}

/// Errors from process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty agent command")]
    EmptyCommand,

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    LaunchFailed {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to signal pid {pid}: {errno}")]
    SignalFailed { pid: u32, errno: nix::errno::Errno },
}

/// Signals the supervisor sends to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful terminate (SIGTERM).
    Term,
    /// Forced kill (SIGKILL).
    Kill,
}

impl StopSignal {
    fn as_nix(self) -> Signal {
        match self {
            StopSignal::Term => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// Observed state of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Alive,
    /// An owned child exited; the code is absent when killed by signal.
    Exited { exit_code: Option<i32> },
    /// No such process.
    Gone,
}

/// Seam between the lifecycle coordinator and the OS.
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Launch a worker, returning its pid.
    async fn spawn(&self, spec: &SpawnSpec) -> Result<u32, ProcessError>;

    /// Current view of a pid. Owned children report exit codes; re-attached
    /// pids only report alive/gone.
    fn poll(&self, pid: u32) -> ProcessStatus;

    fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), ProcessError>;

    /// Whether a live pid is the worker we think it is, rather than an
    /// unrelated process that recycled the pid. Used during startup
    /// reconciliation.
    fn verify_owner(&self, pid: u32, worker_id: &WorkerId) -> bool;

    /// Drop bookkeeping for a pid after its record reached a terminal state.
    fn forget(&self, pid: u32);
}

enum ChildSlot {
    Live(Child),
    Exited(Option<i32>),
}

/// Real subprocess adapter.
#[derive(Clone, Default)]
pub struct SubprocessAdapter {
    children: Arc<Mutex<HashMap<u32, ChildSlot>>>,
}

impl SubprocessAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessAdapter for SubprocessAdapter {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<u32, ProcessError> {
        let program = spec.command.first().ok_or(ProcessError::EmptyCommand)?;

        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .map_err(|e| ProcessError::LogFile {
                path: spec.log_path.clone(),
                source: e,
            })?;
        let log_err = log.try_clone().map_err(|e| ProcessError::LogFile {
            path: spec.log_path.clone(),
            source: e,
        })?;

        let mut cmd = Command::new(program);
        cmd.args(&spec.command[1..])
            .current_dir(&spec.town_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .envs(spec.env())
            // Own process group so the child survives daemon restarts and
            // never receives the daemon's terminal signals by accident.
            .process_group(0)
            .kill_on_drop(false);

        let child = cmd.spawn().map_err(|e| ProcessError::LaunchFailed {
            program: program.clone(),
            source: e,
        })?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::LaunchFailed {
                program: program.clone(),
                source: std::io::Error::other("child exited before pid was read"),
            })?;

        debug!(worker_id = %spec.worker_id, pid, "spawned worker process");
        self.children.lock().insert(pid, ChildSlot::Live(child));
        Ok(pid)
    }

    fn poll(&self, pid: u32) -> ProcessStatus {
        let mut children = self.children.lock();
        match children.get_mut(&pid) {
            Some(ChildSlot::Exited(code)) => ProcessStatus::Exited { exit_code: *code },
            Some(ChildSlot::Live(child)) => match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code();
                    children.insert(pid, ChildSlot::Exited(code));
                    ProcessStatus::Exited { exit_code: code }
                }
                Ok(None) => ProcessStatus::Alive,
                Err(_) => probe(pid),
            },
            None => probe(pid),
        }
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), ProcessError> {
        match kill(Pid::from_raw(pid as i32), Some(signal.as_nix())) {
            Ok(()) => Ok(()),
            // Already gone counts as delivered
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ProcessError::SignalFailed { pid, errno }),
        }
    }

    fn verify_owner(&self, pid: u32, worker_id: &WorkerId) -> bool {
        // Children we spawned ourselves are trivially ours
        if self.children.lock().contains_key(&pid) {
            return true;
        }
        environ_names_worker(pid, worker_id)
    }

    fn forget(&self, pid: u32) {
        self.children.lock().remove(&pid);
    }
}

/// Check `/proc/<pid>/environ` for the worker id handed to the child at
/// spawn time. Pids re-attached after a daemon restart are only trusted
/// when the environment names the exact worker.
#[cfg(target_os = "linux")]
fn environ_names_worker(pid: u32, worker_id: &WorkerId) -> bool {
    let Ok(environ) = std::fs::read(format!("/proc/{pid}/environ")) else {
        return false;
    };
    let needle = format!("WORKER_ID={worker_id}");
    environ
        .split(|b| *b == 0)
        .any(|entry| entry == needle.as_bytes())
}

#[cfg(not(target_os = "linux"))]
fn environ_names_worker(_pid: u32, _worker_id: &WorkerId) -> bool {
    // No /proc to consult; the liveness probe is the best we have
    true
}

/// Existence probe for pids we do not own.
fn probe(pid: u32) -> ProcessStatus {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => ProcessStatus::Alive,
        // EPERM means the process exists but belongs to someone else
        Err(nix::errno::Errno::EPERM) => ProcessStatus::Alive,
        Err(_) => ProcessStatus::Gone,
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
