// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for `worker.*` methods.

use mab_adapters::ProcessAdapter;
use mab_core::{Clock, ErrorKind, WorkerId, WorkerRole, WorkerStatus};
use mab_storage::WorkerFilter;
use serde_json::{json, Value};

use crate::coordinator::SpawnRequest;
use crate::protocol::{parse_params, ListParams, RpcError, SpawnParams, StopParams, WorkerRefParams};

use super::ListenCtx;

pub(super) async fn spawn<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: SpawnParams = parse_params(params)?;
    let role: WorkerRole = params
        .role
        .parse()
        .map_err(|e: mab_core::InvalidRole| RpcError::new(ErrorKind::InvalidRole, e.to_string()))?;

    let worker = ctx
        .coordinator
        .spawn_worker(SpawnRequest {
            role,
            town: params.town,
            instance: params.instance,
            auto_restart: params.auto_restart,
        })
        .await?;

    Ok(json!({
        "worker_id": worker.id,
        "pid": worker.pid,
        "status": worker.status,
    }))
}

pub(super) async fn stop<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: StopParams = parse_params(params)?;
    let worker = ctx
        .coordinator
        .stop_worker(
            &WorkerId::new(params.worker_id),
            params.graceful,
            params.timeout_seconds,
        )
        .await?;
    Ok(json!({ "status": worker.status }))
}

pub(super) async fn restart<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: WorkerRefParams = parse_params(params)?;
    let worker = ctx
        .coordinator
        .restart_worker(&WorkerId::new(params.worker_id))
        .await?;
    Ok(json!({ "new_worker_id": worker.id, "pid": worker.pid }))
}

pub(super) fn list<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: ListParams = parse_params(params)?;

    let mut filter = WorkerFilter::default();
    if let Some(selector) = &params.town {
        match ctx.coordinator.towns().resolve(selector).map_err(RpcError::from)? {
            Some(town) => filter.town_id = Some(town.id),
            // Unknown town filter matches nothing
            None => return Ok(json!({ "workers": [] })),
        }
    }
    if let Some(role) = &params.role {
        filter.role = Some(role.parse::<WorkerRole>().map_err(|e| {
            RpcError::invalid_params(e.to_string())
        })?);
    }
    if let Some(status) = &params.status {
        filter.status = Some(status.parse::<WorkerStatus>().map_err(|e| {
            RpcError::invalid_params(e.to_string())
        })?);
    }

    let workers = ctx
        .coordinator
        .store()
        .list_workers(&filter)
        .map_err(|e| RpcError::internal(e.to_string()))?;
    Ok(json!({ "workers": workers }))
}

pub(super) fn get<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: WorkerRefParams = parse_params(params)?;
    let worker = ctx
        .coordinator
        .worker(&WorkerId::new(&params.worker_id))
        .map_err(RpcError::from)?
        .ok_or_else(|| RpcError::new(ErrorKind::NotFound, format!("worker not found: {}", params.worker_id)))?;
    Ok(json!({ "worker": worker }))
}
