// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::path::PathBuf;
use std::time::Duration;

use mab_core::ErrorKind;
use mab_daemon::protocol::{Request, Response};
use mab_daemon::protocol_wire::{self, ProtocolError};
use thiserror::Error;
use tokio::net::UnixStream;

/// Timeout for a single RPC round trip, overridable for tests and slow
/// operations (env var in milliseconds).
pub fn timeout_rpc() -> Duration {
    std::env::var("MAB_TIMEOUT_RPC_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(120))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon is not running (no socket at {0})")]
    DaemonNotRunning(PathBuf),

    #[error("{message}")]
    Rpc {
        kind: Option<ErrorKind>,
        code: i32,
        message: String,
    },

    #[error("response id does not match request")]
    IdMismatch,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Thin RPC client over the daemon socket.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// True when something is accepting connections on the socket.
    pub fn probe(&self) -> bool {
        std::os::unix::net::UnixStream::connect(&self.socket_path).is_ok()
    }

    /// Call one method and return its result value.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::DaemonNotRunning(self.socket_path.clone()))?;

        let request = Request {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        };

        let timeout = timeout_rpc();
        protocol_wire::write_with_timeout(&mut stream, &request, timeout).await?;
        let response: Response = protocol_wire::read_with_timeout(&mut stream, timeout).await?;

        if response.id != request.id {
            return Err(ClientError::IdMismatch);
        }
        match (response.result, response.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(ClientError::Rpc {
                kind: ErrorKind::from_code(error.code),
                code: error.code,
                message: error.message,
            }),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
