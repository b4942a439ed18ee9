// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart supervisor.
//!
//! Consumes failure notices from the coordinator and schedules policy
//! respawns with exponential backoff. Pending respawns are plain tasks
//! parked on a sleep; shutdown cancels them via the shared notify without
//! touching `restart_count`.

use std::sync::Arc;
use std::time::Duration;

use mab_adapters::ProcessAdapter;
use mab_core::{Clock, RestartPolicyConfig, WorkerRecord, WorkerStatus};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{Coordinator, FailureNotice};

/// Backoff before respawn attempt number `effective_count + 1`:
/// `min(backoff_max, backoff_base * 2^effective_count)`.
pub fn backoff_delay(policy: &RestartPolicyConfig, effective_count: u32) -> Duration {
    let factor = 2u64.saturating_pow(effective_count);
    let secs = policy
        .backoff_base_seconds
        .saturating_mul(factor)
        .min(policy.backoff_max_seconds);
    Duration::from_secs(secs)
}

/// Restart count that applies to this failure: the record's own count
/// inside the cooldown window, zero once the last failure is older than
/// `cooldown_seconds`.
pub fn effective_restart_count(
    policy: &RestartPolicyConfig,
    record: &WorkerRecord,
    now_ms: u64,
) -> u32 {
    match record.stopped_at_ms {
        Some(failed_at)
            if now_ms.saturating_sub(failed_at) <= policy.cooldown_seconds * 1000 =>
        {
            record.restart_count
        }
        _ => 0,
    }
}

pub fn spawn_restart_supervisor<P: ProcessAdapter, C: Clock>(
    coordinator: Arc<Coordinator<P, C>>,
    mut failures: mpsc::UnboundedReceiver<FailureNotice>,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                notice = failures.recv() => match notice {
                    Some(notice) => handle_failure(&coordinator, &shutdown, notice).await,
                    None => break,
                },
            }
        }
    })
}

async fn handle_failure<P: ProcessAdapter, C: Clock>(
    coordinator: &Arc<Coordinator<P, C>>,
    shutdown: &Arc<Notify>,
    notice: FailureNotice,
) {
    if !notice.restart_eligible {
        return;
    }

    let record = match coordinator.worker(&notice.worker_id) {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(e) => {
            warn!(worker_id = %notice.worker_id, "cannot read failed worker: {e}");
            return;
        }
    };
    if record.status != WorkerStatus::Failed || !record.auto_restart {
        return;
    }

    let policy = coordinator.config_for(&record).restart_policy;
    if !policy.enabled {
        return;
    }

    let effective = effective_restart_count(&policy, &record, coordinator.now_ms());
    if effective >= policy.max_restarts {
        warn!(
            worker_id = %record.id,
            restart_count = record.restart_count,
            max_restarts = policy.max_restarts,
            "restart budget exhausted; leaving worker failed"
        );
        return;
    }

    let delay = backoff_delay(&policy, effective);
    info!(
        worker_id = %record.id,
        delay_secs = delay.as_secs(),
        attempt = effective + 1,
        "scheduling respawn"
    );

    let coordinator = Arc::clone(coordinator);
    let shutdown = Arc::clone(shutdown);
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!(worker_id = %record.id, "pending respawn cancelled by shutdown");
            }
            _ = tokio::time::sleep(delay) => {
                match coordinator.respawn_from(&record.id, effective + 1).await {
                    Ok(Some(worker)) => {
                        debug!(worker_id = %worker.id, "respawn complete");
                    }
                    Ok(None) => {
                        debug!(worker_id = %record.id, "respawn no longer applicable");
                    }
                    Err(e) => {
                        warn!(worker_id = %record.id, "respawn failed: {e}");
                    }
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
