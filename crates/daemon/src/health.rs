// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health monitor task.
//!
//! A periodic sweep over live workers; all transition logic lives in the
//! coordinator so the monitor is just a timer. Per-town heartbeat timeouts
//! and thresholds are applied inside the sweep; the tick interval itself is
//! the global setting.

use std::sync::Arc;
use std::time::Duration;

use mab_adapters::ProcessAdapter;
use mab_core::Clock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::error;

use crate::coordinator::Coordinator;

pub fn spawn_health_monitor<P: ProcessAdapter, C: Clock>(
    coordinator: Arc<Coordinator<P, C>>,
    shutdown: Arc<Notify>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh daemon does
        // not race startup reconciliation.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {
                    if let Err(e) = coordinator.poll_health().await {
                        error!("health sweep failed: {e}");
                    }
                }
            }
        }
    })
}
