// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent roles.
//!
//! Roles are a closed set; a role maps to the prompt file handed to the
//! agent process at spawn time. Unknown role strings are rejected at the
//! RPC boundary, never dispatched dynamically.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of an agent worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Developer,
    Qa,
    TechLead,
    Manager,
    Reviewer,
}

/// Error for role strings outside the recognized set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid role: {0}")]
pub struct InvalidRole(pub String);

impl WorkerRole {
    /// All recognized roles, in display order.
    pub const ALL: [WorkerRole; 5] = [
        WorkerRole::Developer,
        WorkerRole::Qa,
        WorkerRole::TechLead,
        WorkerRole::Manager,
        WorkerRole::Reviewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Developer => "developer",
            WorkerRole::Qa => "qa",
            WorkerRole::TechLead => "tech_lead",
            WorkerRole::Manager => "manager",
            WorkerRole::Reviewer => "reviewer",
        }
    }

    /// Prompt filename for this role.
    pub fn prompt_file(&self) -> &'static str {
        match self {
            WorkerRole::Developer => "DEVELOPER.md",
            WorkerRole::Qa => "QA.md",
            WorkerRole::TechLead => "TECH_LEAD.md",
            WorkerRole::Manager => "MANAGER.md",
            WorkerRole::Reviewer => "CODE_REVIEWER.md",
        }
    }

    /// Prompt file for this role under the prompts directory.
    pub fn prompt_path(&self, prompts_dir: &Path) -> PathBuf {
        prompts_dir.join(self.prompt_file())
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerRole {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer" => Ok(WorkerRole::Developer),
            "qa" => Ok(WorkerRole::Qa),
            "tech_lead" => Ok(WorkerRole::TechLead),
            "manager" => Ok(WorkerRole::Manager),
            "reviewer" => Ok(WorkerRole::Reviewer),
            other => Err(InvalidRole(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
