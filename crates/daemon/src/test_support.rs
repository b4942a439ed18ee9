// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures for daemon tests.

use std::sync::Arc;

use mab_adapters::FakeProcessAdapter;
use mab_core::{ConfigResolver, FakeClock, WorkerRecord, WorkerRole};
use mab_storage::Store;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::coordinator::{Coordinator, FailureNotice, SpawnRequest};

/// A coordinator wired to fakes, with one town directory on disk.
pub struct TestBed {
    pub home: TempDir,
    pub town_dir: TempDir,
    pub coordinator: Arc<Coordinator<FakeProcessAdapter, FakeClock>>,
    pub failures: mpsc::UnboundedReceiver<FailureNotice>,
    pub procs: FakeProcessAdapter,
    pub clock: FakeClock,
}

impl TestBed {
    pub fn new() -> Self {
        Self::with_configs(None, None)
    }

    /// Optionally seed the global and per-town config documents.
    pub fn with_configs(global_yaml: Option<&str>, town_yaml: Option<&str>) -> Self {
        let home = TempDir::new().unwrap();
        let town_dir = TempDir::new().unwrap();

        if let Some(global) = global_yaml {
            std::fs::write(home.path().join("config.yaml"), global).unwrap();
        }
        if let Some(town) = town_yaml {
            let mab_dir = town_dir.path().join(".mab");
            std::fs::create_dir_all(&mab_dir).unwrap();
            std::fs::write(mab_dir.join("config.yaml"), town).unwrap();
        }

        let store = Arc::new(Store::open_in_memory().unwrap());
        let clock = FakeClock::now();
        let procs = FakeProcessAdapter::new();
        let resolver = ConfigResolver::new(home.path());
        let (coordinator, failures) = Coordinator::new(
            store,
            procs.clone(),
            clock.clone(),
            resolver,
            home.path().to_path_buf(),
        );

        Self {
            home,
            town_dir,
            coordinator,
            failures,
            procs,
            clock,
        }
    }

    /// The town directory as a spawn selector.
    pub fn town_selector(&self) -> String {
        self.town_dir.path().to_string_lossy().into_owned()
    }

    pub async fn spawn(&self, role: WorkerRole) -> WorkerRecord {
        self.coordinator
            .spawn_worker(SpawnRequest {
                role,
                town: Some(self.town_selector()),
                instance: None,
                auto_restart: None,
            })
            .await
            .unwrap()
    }

    pub fn touch_heartbeat(&self, worker: &WorkerRecord) {
        std::fs::File::create(&worker.heartbeat_path).unwrap();
    }

    /// Drive a freshly spawned worker to RUNNING via an observed heartbeat.
    pub async fn promote(&self, worker: &WorkerRecord) -> WorkerRecord {
        self.touch_heartbeat(worker);
        self.coordinator.poll_health().await.unwrap();
        self.coordinator.worker(&worker.id).unwrap().unwrap()
    }

    pub fn reload(&self, worker: &WorkerRecord) -> WorkerRecord {
        self.coordinator.worker(&worker.id).unwrap().unwrap()
    }
}
