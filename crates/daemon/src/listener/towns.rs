// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for `town.*` methods.

use mab_adapters::ProcessAdapter;
use mab_core::{Clock, ErrorKind};
use serde_json::{json, Value};
use tracing::warn;

use crate::coordinator::CoordError;
use crate::protocol::{parse_params, RpcError, TownCreateParams, TownDeleteParams, TownRefParams};

use super::ListenCtx;

pub(super) fn create<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: TownCreateParams = parse_params(params)?;
    let town = ctx
        .coordinator
        .towns()
        .create(&params.name, &params.path, params.config)?;
    Ok(json!({ "town_id": town.id }))
}

pub(super) fn list<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
) -> Result<Value, RpcError> {
    let towns = ctx.coordinator.towns().list()?;
    Ok(json!({ "towns": towns }))
}

pub(super) fn get<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: TownRefParams = parse_params(params)?;
    let town = ctx
        .coordinator
        .towns()
        .resolve(&params.town_id_or_name)?
        .ok_or_else(|| not_found(&params.town_id_or_name))?;
    Ok(json!({ "town": town }))
}

pub(super) async fn delete<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: TownDeleteParams = parse_params(params)?;
    let towns = ctx.coordinator.towns();
    let town = towns
        .resolve(&params.town_id_or_name)?
        .ok_or_else(|| not_found(&params.town_id_or_name))?;

    let live = towns.live_workers(&town)?;
    if live > 0 {
        if !params.force {
            return Err(CoordError::HasLiveWorkers(format!(
                "town {} has {live} live workers",
                town.name
            ))
            .into());
        }
        // Forced delete tears the workers down first
        let workers = ctx
            .coordinator
            .store()
            .list_workers(&mab_storage::WorkerFilter {
                town_id: Some(town.id.clone()),
                ..Default::default()
            })
            .map_err(|e| RpcError::internal(e.to_string()))?;
        for worker in workers.iter().filter(|w| !w.is_terminal()) {
            if let Err(e) = ctx.coordinator.stop_worker(&worker.id, false, None).await {
                warn!(worker_id = %worker.id, "failed to stop worker for town delete: {e}");
            }
        }
    }

    let deleted = towns.delete(&town)?;
    Ok(json!({ "deleted": deleted }))
}

fn not_found(selector: &str) -> RpcError {
    RpcError::new(ErrorKind::NotFound, format!("town not found: {selector}"))
}
