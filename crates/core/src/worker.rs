// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker records and lifecycle status.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::IdGen;
use crate::role::WorkerRole;
use crate::town::TownId;

crate::define_id! {
    /// Unique identifier for a worker instance, `worker-<role>-<suffix>`.
    pub struct WorkerId;
}

impl WorkerId {
    /// Generate a fresh worker id for a role.
    pub fn generate(role: WorkerRole, ids: &impl IdGen) -> Self {
        Self(format!("worker-{}-{}", role, ids.next()))
    }
}

/// Lifecycle status of a worker record.
///
/// `Stopped` and `Failed` are terminal: a restart creates a new record
/// rather than reviving the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Error for status strings outside the recognized set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status: {0}")]
pub struct InvalidStatus(pub String);

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Stopped | WorkerStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(WorkerStatus::Starting),
            "running" => Ok(WorkerStatus::Running),
            "stopping" => Ok(WorkerStatus::Stopping),
            "stopped" => Ok(WorkerStatus::Stopped),
            "failed" => Ok(WorkerStatus::Failed),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

/// Persistent record of one worker process.
///
/// Succession is a forward-only chain: a respawn creates a new record whose
/// `predecessor` points at the failed one; `restart_count` lives on the
/// current record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub town_id: TownId,
    pub role: WorkerRole,
    /// Distinguishes multiple workers of the same role in one town (>= 1).
    pub instance: u32,
    pub pid: Option<u32>,
    pub status: WorkerStatus,
    pub started_at_ms: Option<u64>,
    pub stopped_at_ms: Option<u64>,
    pub last_heartbeat_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub restart_count: u32,
    pub auto_restart: bool,
    pub log_path: PathBuf,
    pub heartbeat_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessor: Option<WorkerId>,
}

impl WorkerRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
