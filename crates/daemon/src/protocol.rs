// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol for daemon communication.
//!
//! Requests carry `{id, method, params}`; responses echo the `id` with
//! either `result` or `error {code, message}`. Responses on one connection
//! may be interleaved in any order, correlated by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use mab_core::ErrorKind;

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Wire form of an RPC error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// Response from the daemon to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: &RpcError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(ErrorBody {
                code: error.kind.code(),
                message: error.message.clone(),
            }),
        }
    }
}

/// Typed RPC error: a stable kind plus a human-readable message.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("method not found: {method}"))
    }

    pub fn shutting_down() -> Self {
        Self::new(ErrorKind::ShuttingDown, "daemon is shutting down")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Deserialize method params, mapping failures to `invalid_params`.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn default_true() -> bool {
    true
}

/// Params for `worker.spawn`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnParams {
    pub role: String,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub instance: Option<u32>,
    #[serde(default)]
    pub auto_restart: Option<bool>,
}

/// Params for `worker.stop`.
#[derive(Debug, Clone, Deserialize)]
pub struct StopParams {
    pub worker_id: String,
    #[serde(default = "default_true")]
    pub graceful: bool,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Params for `worker.restart` and `worker.get`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerRefParams {
    pub worker_id: String,
}

/// Params for `worker.list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Params for `town.create`.
#[derive(Debug, Clone, Deserialize)]
pub struct TownCreateParams {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub config: Option<Value>,
}

/// Params for `town.get`.
#[derive(Debug, Clone, Deserialize)]
pub struct TownRefParams {
    pub town_id_or_name: String,
}

/// Params for `town.delete`.
#[derive(Debug, Clone, Deserialize)]
pub struct TownDeleteParams {
    pub town_id_or_name: String,
    #[serde(default)]
    pub force: bool,
}

/// Params for `daemon.shutdown`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownParams {
    #[serde(default = "default_true")]
    pub graceful: bool,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
