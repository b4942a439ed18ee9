// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for `daemon.*` methods.

use std::sync::atomic::Ordering;

use mab_adapters::ProcessAdapter;
use mab_core::Clock;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::protocol::{parse_params, RpcError, ShutdownParams};

use super::ListenCtx;

pub(super) fn status<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
) -> Result<Value, RpcError> {
    let store = ctx.coordinator.store();

    let mut workers_by_status = Map::new();
    for (status, count) in store
        .status_counts()
        .map_err(|e| RpcError::internal(e.to_string()))?
    {
        workers_by_status.insert(status.to_string(), json!(count));
    }

    let towns = ctx.coordinator.towns();
    let mut town_entries = Vec::new();
    for town in towns.list()? {
        let live = towns.live_workers(&town)?;
        town_entries.push(json!({
            "town_id": town.id,
            "name": town.name,
            "path": town.path,
            "live_workers": live,
        }));
    }

    Ok(json!({
        "uptime": ctx.start_time.elapsed().as_secs(),
        "workers_by_status": workers_by_status,
        "towns": town_entries,
    }))
}

pub(super) fn shutdown<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    params: Value,
) -> Result<Value, RpcError> {
    let params: ShutdownParams = if params.is_null() {
        ShutdownParams { graceful: true }
    } else {
        parse_params(params)?
    };

    info!(graceful = params.graceful, "shutdown requested via RPC");
    if !params.graceful {
        ctx.force_shutdown.store(true, Ordering::SeqCst);
    }
    ctx.shutdown_requested.notify_one();
    Ok(json!({ "accepted": true }))
}
