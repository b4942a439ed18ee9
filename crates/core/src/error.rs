// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error kinds surfaced over RPC.
//!
//! The string form is the contract; numeric codes are stable but opaque.
//! Reserved JSON-RPC codes are used where they exist, custom kinds live in
//! the -32000 range.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable error taxonomy for RPC responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyRunning,
    InvalidRole,
    UnknownTown,
    Duplicate,
    InvalidPath,
    InvalidParams,
    MethodNotFound,
    Capacity,
    NotFound,
    AlreadyTerminal,
    HasLiveWorkers,
    SpawnFailed,
    ShuttingDown,
    StoreCorrupt,
    ProtocolError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::InvalidRole => "invalid_role",
            ErrorKind::UnknownTown => "unknown_town",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::InvalidPath => "invalid_path",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::MethodNotFound => "method_not_found",
            ErrorKind::Capacity => "capacity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyTerminal => "already_terminal",
            ErrorKind::HasLiveWorkers => "has_live_workers",
            ErrorKind::SpawnFailed => "spawn_failed",
            ErrorKind::ShuttingDown => "shutting_down",
            ErrorKind::StoreCorrupt => "store_corrupt",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::Internal => "internal",
        }
    }

    /// Numeric wire code for this kind.
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::ProtocolError => -32700,
            ErrorKind::MethodNotFound => -32601,
            ErrorKind::InvalidParams => -32602,
            ErrorKind::Internal => -32603,
            ErrorKind::AlreadyRunning => -32000,
            ErrorKind::ShuttingDown => -32003,
            ErrorKind::InvalidRole => -32010,
            ErrorKind::UnknownTown => -32011,
            ErrorKind::Duplicate => -32012,
            ErrorKind::InvalidPath => -32013,
            ErrorKind::Capacity => -32014,
            ErrorKind::NotFound => -32015,
            ErrorKind::AlreadyTerminal => -32016,
            ErrorKind::HasLiveWorkers => -32017,
            ErrorKind::SpawnFailed => -32018,
            ErrorKind::StoreCorrupt => -32019,
        }
    }

    /// Reverse lookup from a wire code, for clients.
    pub fn from_code(code: i32) -> Option<Self> {
        const ALL: [ErrorKind; 16] = [
            ErrorKind::AlreadyRunning,
            ErrorKind::InvalidRole,
            ErrorKind::UnknownTown,
            ErrorKind::Duplicate,
            ErrorKind::InvalidPath,
            ErrorKind::InvalidParams,
            ErrorKind::MethodNotFound,
            ErrorKind::Capacity,
            ErrorKind::NotFound,
            ErrorKind::AlreadyTerminal,
            ErrorKind::HasLiveWorkers,
            ErrorKind::SpawnFailed,
            ErrorKind::ShuttingDown,
            ErrorKind::StoreCorrupt,
            ErrorKind::ProtocolError,
            ErrorKind::Internal,
        ];
        ALL.into_iter().find(|k| k.code() == code)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
