// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process adapter for deterministic testing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ProcessAdapter, ProcessError, ProcessStatus, SpawnSpec, StopSignal};

/// Recorded call to FakeProcessAdapter
#[derive(Debug, Clone)]
pub enum ProcessCall {
    Spawn { worker_id: String, pid: u32 },
    Signal { pid: u32, signal: StopSignal },
    Forget { pid: u32 },
}

struct FakeState {
    next_pid: u32,
    statuses: HashMap<u32, ProcessStatus>,
    specs: Vec<SpawnSpec>,
    calls: Vec<ProcessCall>,
    spawn_error: Option<String>,
    /// When set, SIGTERM is ignored (worker that refuses to wind down).
    ignore_term: bool,
    /// When set, even SIGKILL leaves the process alive.
    ignore_kill: bool,
    /// Pids whose ownership check should fail (pid recycled by a stranger).
    disowned: std::collections::HashSet<u32>,
}

/// Fake process adapter.
///
/// Spawn hands out increasing pids; signals resolve synchronously so
/// lifecycle tests never sleep. Liveness is fully scriptable.
#[derive(Clone)]
pub struct FakeProcessAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                next_pid: 1000,
                statuses: HashMap::new(),
                specs: Vec::new(),
                calls: Vec::new(),
                spawn_error: None,
                ignore_term: false,
                ignore_kill: false,
                disowned: std::collections::HashSet::new(),
            })),
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.inner.lock().calls.clone()
    }

    /// Specs passed to spawn, in order
    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.inner.lock().specs.clone()
    }

    /// Number of Term/Kill signals delivered to a pid
    pub fn signals_sent(&self, pid: u32) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProcessCall::Signal { pid: p, .. } if *p == pid))
            .count()
    }

    /// Fail the next spawn with this message
    pub fn set_spawn_error(&self, message: impl Into<String>) {
        self.inner.lock().spawn_error = Some(message.into());
    }

    pub fn set_ignore_term(&self, ignore: bool) {
        self.inner.lock().ignore_term = ignore;
    }

    pub fn set_ignore_kill(&self, ignore: bool) {
        self.inner.lock().ignore_kill = ignore;
    }

    /// Mark a pid as exited with the given code
    pub fn exit(&self, pid: u32, exit_code: Option<i32>) {
        self.inner
            .lock()
            .statuses
            .insert(pid, ProcessStatus::Exited { exit_code });
    }

    /// Make a pid disappear entirely (as if reaped by someone else)
    pub fn vanish(&self, pid: u32) {
        self.inner.lock().statuses.insert(pid, ProcessStatus::Gone);
    }

    /// Register a pid that was never spawned through this adapter
    pub fn preset(&self, pid: u32, status: ProcessStatus) {
        self.inner.lock().statuses.insert(pid, status);
    }

    /// Make ownership verification fail for a pid
    pub fn disown(&self, pid: u32) {
        self.inner.lock().disowned.insert(pid);
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<u32, ProcessError> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.spawn_error.take() {
            return Err(ProcessError::LaunchFailed {
                program: spec.command.first().cloned().unwrap_or_default(),
                source: std::io::Error::other(message),
            });
        }
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.statuses.insert(pid, ProcessStatus::Alive);
        inner.specs.push(spec.clone());
        inner.calls.push(ProcessCall::Spawn {
            worker_id: spec.worker_id.to_string(),
            pid,
        });
        Ok(pid)
    }

    fn poll(&self, pid: u32) -> ProcessStatus {
        self.inner
            .lock()
            .statuses
            .get(&pid)
            .copied()
            .unwrap_or(ProcessStatus::Gone)
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Signal { pid, signal });
        let resolves = match signal {
            StopSignal::Term => !inner.ignore_term,
            StopSignal::Kill => !inner.ignore_kill,
        };
        if resolves && matches!(inner.statuses.get(&pid), Some(ProcessStatus::Alive)) {
            let exit_code = match signal {
                StopSignal::Term => Some(0),
                StopSignal::Kill => None,
            };
            inner
                .statuses
                .insert(pid, ProcessStatus::Exited { exit_code });
        }
        Ok(())
    }

    fn verify_owner(&self, pid: u32, _worker_id: &mab_core::WorkerId) -> bool {
        !self.inner.lock().disowned.contains(&pid)
    }

    fn forget(&self, pid: u32) {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Forget { pid });
        inner.statuses.remove(&pid);
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
