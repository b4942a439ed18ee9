// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle coordinator: the single writer of worker state.
//!
//! Every transition for a given worker is serialised by a per-worker lock
//! and persisted to the store before any external side effect (signal,
//! spawn). If the daemon crashes mid-transition the store still reflects
//! the pre-effect state and startup reconciliation fixes up reality.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mab_adapters::{heartbeat, ProcessAdapter, ProcessStatus, SpawnSpec, StopSignal};
use mab_core::{
    Clock, ConfigResolver, ErrorKind, MabConfig, TownRecord, UuidIdGen, WorkerId, WorkerRecord,
    WorkerRole, WorkerStatus,
};
use mab_storage::{Store, StoreError, WorkerFilter};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::protocol::RpcError;
use crate::towns::TownRegistry;

/// A worker in STARTING that has neither heartbeat nor exit by this age is
/// failed with "startup timeout".
pub const STARTUP_TIMEOUT_MS: u64 = 30_000;

/// A live pid is promoted STARTING -> RUNNING past this age even without a
/// heartbeat; the heartbeat timeout takes over from there.
pub const STARTING_GRACE_MS: u64 = 5_000;

/// Poll cadence while waiting on a process to exit.
const EXIT_POLL: Duration = Duration::from_millis(25);

/// Failure notification for the restart supervisor.
#[derive(Debug, Clone)]
pub struct FailureNotice {
    pub worker_id: WorkerId,
    /// Health failures and reconciliation orphans are eligible for policy
    /// restart; user-initiated stops are not.
    pub restart_eligible: bool,
}

/// Coordinator errors, mapped onto the stable RPC taxonomy.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("unknown town: {0}")]
    UnknownTown(String),

    #[error("town {town} is at capacity ({limit} workers)")]
    Capacity { town: String, limit: u32 },

    #[error("worker not found: {0}")]
    NotFound(String),

    #[error("worker {0} is already {1}")]
    AlreadyTerminal(WorkerId, WorkerStatus),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("spawn failed: {role} instance {instance} is busy")]
    SlotBusy { role: WorkerRole, instance: u32 },

    #[error("duplicate town path: {0}")]
    DuplicateTown(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("town has live workers: {0}")]
    HasLiveWorkers(String),

    #[error("daemon is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl CoordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordError::InvalidRole(_) => ErrorKind::InvalidRole,
            CoordError::UnknownTown(_) => ErrorKind::UnknownTown,
            CoordError::Capacity { .. } => ErrorKind::Capacity,
            CoordError::NotFound(_) => ErrorKind::NotFound,
            CoordError::AlreadyTerminal(_, _) => ErrorKind::AlreadyTerminal,
            CoordError::SpawnFailed(_) | CoordError::SlotBusy { .. } => ErrorKind::SpawnFailed,
            CoordError::DuplicateTown(_) => ErrorKind::Duplicate,
            CoordError::InvalidPath(_) => ErrorKind::InvalidPath,
            CoordError::HasLiveWorkers(_) => ErrorKind::HasLiveWorkers,
            CoordError::ShuttingDown => ErrorKind::ShuttingDown,
            CoordError::Internal(_) => ErrorKind::Internal,
            CoordError::Store(StoreError::Corrupt(_)) => ErrorKind::StoreCorrupt,
            CoordError::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for CoordError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => CoordError::NotFound(id),
            other => CoordError::Store(other),
        }
    }
}

impl From<CoordError> for RpcError {
    fn from(e: CoordError) -> Self {
        RpcError::new(e.kind(), e.to_string())
    }
}

/// Arguments for a spawn, straight from the RPC surface.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub role: WorkerRole,
    pub town: Option<String>,
    pub instance: Option<u32>,
    pub auto_restart: Option<bool>,
}

/// Outcome of startup reconciliation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub confirmed_running: usize,
    pub orphaned: usize,
}

pub struct Coordinator<P: ProcessAdapter, C: Clock> {
    store: Arc<Store>,
    towns: TownRegistry<C>,
    procs: P,
    clock: C,
    ids: UuidIdGen,
    resolver: ConfigResolver,
    prompts_dir: PathBuf,
    locks: parking_lot::Mutex<HashMap<WorkerId, Arc<tokio::sync::Mutex<()>>>>,
    /// Consecutive heartbeat misses per worker, owned by the health sweep.
    misses: parking_lot::Mutex<HashMap<WorkerId, u32>>,
    failures: mpsc::UnboundedSender<FailureNotice>,
    draining: AtomicBool,
}

impl<P: ProcessAdapter, C: Clock> Coordinator<P, C> {
    pub fn new(
        store: Arc<Store>,
        procs: P,
        clock: C,
        resolver: ConfigResolver,
        mab_home: PathBuf,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FailureNotice>) {
        let (failures, rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(Self {
            towns: TownRegistry::new(Arc::clone(&store), clock.clone()),
            store,
            procs,
            clock,
            ids: UuidIdGen,
            resolver: resolver.clone(),
            prompts_dir: mab_home.join("prompts"),
            locks: parking_lot::Mutex::new(HashMap::new()),
            misses: parking_lot::Mutex::new(HashMap::new()),
            failures,
            draining: AtomicBool::new(false),
        });
        (coordinator, rx)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn towns(&self) -> &TownRegistry<C> {
        &self.towns
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>, CoordError> {
        Ok(self.store.get_worker(id)?)
    }

    /// Effective config for the town a worker lives in.
    pub fn config_for(&self, worker: &WorkerRecord) -> MabConfig {
        match self.store.get_town(&worker.town_id) {
            Ok(Some(town)) => self.config_for_town(&town),
            _ => self.resolver.effective(None, None),
        }
    }

    pub fn config_for_town(&self, town: &TownRecord) -> MabConfig {
        self.resolver
            .effective(Some(&town.path), town.config_overrides.as_ref())
    }

    fn lock_for(&self, id: &WorkerId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    fn notify_failure(&self, worker_id: &WorkerId, restart_eligible: bool) {
        let _ = self.failures.send(FailureNotice {
            worker_id: worker_id.clone(),
            restart_eligible,
        });
    }

    // ── Spawn ───────────────────────────────────────────────────────────

    /// Resolve the target town for a spawn, auto-creating path targets when
    /// the config allows it. With no selector, a single registered town is
    /// used; anything else is `unknown_town`.
    fn resolve_spawn_town(&self, selector: Option<&str>) -> Result<TownRecord, CoordError> {
        match selector {
            Some(s) if s.starts_with('/') => {
                let canonical = std::fs::canonicalize(s)
                    .map_err(|e| CoordError::UnknownTown(format!("{s}: {e}")))?;
                if let Some(town) = self.store.get_town_by_path(&canonical)? {
                    return Ok(town);
                }
                let auto_create = self
                    .resolver
                    .effective(Some(&canonical), None)
                    .auto_create_town;
                if !auto_create {
                    return Err(CoordError::UnknownTown(s.to_string()));
                }
                let name = canonical
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "town".to_string());
                self.towns.register(name, canonical, None)
            }
            Some(s) => self
                .towns
                .resolve(s)?
                .ok_or_else(|| CoordError::UnknownTown(s.to_string())),
            None => {
                let mut towns = self.store.list_towns()?;
                match (towns.pop(), towns.is_empty()) {
                    (Some(town), true) => Ok(town),
                    (None, _) => Err(CoordError::UnknownTown("no towns registered".to_string())),
                    _ => Err(CoordError::UnknownTown(
                        "multiple towns registered; specify one".to_string(),
                    )),
                }
            }
        }
    }

    /// Spawn a new worker. The record is persisted in STARTING before the
    /// process is launched; a launch failure leaves it FAILED with the
    /// diagnostic.
    pub async fn spawn_worker(&self, req: SpawnRequest) -> Result<WorkerRecord, CoordError> {
        if self.is_draining() {
            return Err(CoordError::ShuttingDown);
        }

        let town = self.resolve_spawn_town(req.town.as_deref())?;
        let config = self.config_for_town(&town);

        let live = self.store.count_non_terminal_in_town(&town.id)?;
        if live >= config.max_workers_per_town {
            return Err(CoordError::Capacity {
                town: town.name.clone(),
                limit: config.max_workers_per_town,
            });
        }

        let instance = match req.instance {
            Some(n) if n >= 1 => n,
            Some(n) => {
                return Err(CoordError::SpawnFailed(format!(
                    "instance must be >= 1, got {n}"
                )))
            }
            None => {
                let taken = self.store.live_instances(&town.id, req.role)?;
                let mut n = 1;
                while taken.contains(&n) {
                    n += 1;
                }
                n
            }
        };

        let record = self.build_record(
            &town,
            req.role,
            instance,
            0,
            None,
            req.auto_restart.unwrap_or(true),
        );
        self.launch(record, &town, &config).await
    }

    fn build_record(
        &self,
        town: &TownRecord,
        role: WorkerRole,
        instance: u32,
        restart_count: u32,
        predecessor: Option<WorkerId>,
        auto_restart: bool,
    ) -> WorkerRecord {
        let id = WorkerId::generate(role, &self.ids);
        WorkerRecord {
            log_path: heartbeat::log_path(&town.path, &id),
            heartbeat_path: heartbeat::heartbeat_path(&town.path, &id),
            id,
            town_id: town.id.clone(),
            role,
            instance,
            pid: None,
            status: WorkerStatus::Starting,
            started_at_ms: Some(self.clock.now_ms()),
            stopped_at_ms: None,
            last_heartbeat_ms: None,
            exit_code: None,
            error_message: None,
            restart_count,
            auto_restart,
            predecessor,
        }
    }

    /// Persist a STARTING record, then launch its process.
    async fn launch(
        &self,
        record: WorkerRecord,
        town: &TownRecord,
        config: &MabConfig,
    ) -> Result<WorkerRecord, CoordError> {
        self.store.insert_worker(&record).map_err(|e| match e {
            StoreError::InstanceBusy { role, instance } => CoordError::SlotBusy { role, instance },
            other => CoordError::from(other),
        })?;

        for dir in [
            town.path.join(".mab").join("logs"),
            town.path.join(".mab").join("heartbeat"),
        ] {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                let reason = format!("spawn failed: cannot create {}: {e}", dir.display());
                self.store
                    .mark_failed(&record.id, self.clock.now_ms(), &reason, None)?;
                return Err(CoordError::SpawnFailed(reason));
            }
        }

        let spec = SpawnSpec {
            worker_id: record.id.clone(),
            role: record.role,
            town_path: town.path.clone(),
            log_path: record.log_path.clone(),
            heartbeat_path: record.heartbeat_path.clone(),
            prompt_path: record.role.prompt_path(&self.prompts_dir),
            command: config.agent_command.clone(),
        };

        match self.procs.spawn(&spec).await {
            Ok(pid) => {
                self.store.set_worker_pid(&record.id, pid)?;
                info!(worker_id = %record.id, pid, role = %record.role, "worker spawned");
                Ok(self
                    .store
                    .get_worker(&record.id)?
                    .ok_or_else(|| CoordError::NotFound(record.id.to_string()))?)
            }
            Err(e) => {
                let reason = format!("spawn failed: {e}");
                self.store
                    .mark_failed(&record.id, self.clock.now_ms(), &reason, None)?;
                warn!(worker_id = %record.id, error = %e, "worker spawn failed");
                Err(CoordError::SpawnFailed(e.to_string()))
            }
        }
    }

    // ── Stop / restart ──────────────────────────────────────────────────

    /// Stop a worker. Graceful stops send SIGTERM and wait out the grace
    /// period before escalating to SIGKILL; a stop that needed the
    /// escalation ends FAILED ("force killed on shutdown"), a clean one
    /// ends STOPPED.
    pub async fn stop_worker(
        &self,
        id: &WorkerId,
        graceful: bool,
        timeout_seconds: Option<u64>,
    ) -> Result<WorkerRecord, CoordError> {
        let initial = self
            .store
            .get_worker(id)?
            .ok_or_else(|| CoordError::NotFound(id.to_string()))?;
        if initial.is_terminal() {
            return Err(CoordError::AlreadyTerminal(id.clone(), initial.status));
        }

        // A graceful stop against STARTING waits for the status to resolve
        // (the health sweep promotes or fails it). Waiting happens outside
        // the per-worker lock so the sweep can make progress. A force stop
        // kills immediately.
        if graceful && initial.status == WorkerStatus::Starting {
            self.wait_starting_resolution(id).await?;
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let worker = self
            .store
            .get_worker(id)?
            .ok_or_else(|| CoordError::NotFound(id.to_string()))?;
        if worker.is_terminal() {
            // Resolved terminal while we waited; nothing left to signal
            return Ok(worker);
        }

        let config = self.config_for(&worker);
        let grace = timeout_seconds.unwrap_or(config.shutdown.worker_grace_seconds);
        let force_timeout = config.shutdown.force_kill_timeout_seconds;

        self.store.mark_stopping(id)?;

        let Some(pid) = worker.pid else {
            // Nothing running; the record just ends
            self.store.mark_stopped(id, self.clock.now_ms(), None)?;
            self.finish_terminal(&worker);
            return Ok(self.must_get(id)?);
        };

        if graceful {
            self.procs
                .signal(pid, StopSignal::Term)
                .map_err(|e| CoordError::Internal(e.to_string()))?;
            if let Some(exit_code) = self.wait_exit(pid, grace).await {
                self.store
                    .mark_stopped(id, self.clock.now_ms(), exit_code)?;
            } else {
                // Grace exceeded: force kill, and the record ends FAILED
                let _ = self.procs.signal(pid, StopSignal::Kill);
                let exit_code = self.wait_exit(pid, force_timeout).await.flatten();
                self.store.mark_failed(
                    id,
                    self.clock.now_ms(),
                    "force killed on shutdown",
                    exit_code,
                )?;
            }
        } else {
            let _ = self.procs.signal(pid, StopSignal::Kill);
            if let Some(exit_code) = self.wait_exit(pid, force_timeout).await {
                self.store
                    .mark_stopped(id, self.clock.now_ms(), exit_code)?;
            } else {
                self.store.mark_failed(
                    id,
                    self.clock.now_ms(),
                    "force killed on shutdown",
                    None,
                )?;
            }
        }

        self.procs.forget(pid);
        self.finish_terminal(&worker);
        Ok(self.must_get(id)?)
    }

    /// Restart = stop (when needed) + a fresh record for the same
    /// `(town, role, instance)`. Manual intent resets `restart_count`.
    pub async fn restart_worker(&self, id: &WorkerId) -> Result<WorkerRecord, CoordError> {
        if self.is_draining() {
            return Err(CoordError::ShuttingDown);
        }

        let old = self
            .store
            .get_worker(id)?
            .ok_or_else(|| CoordError::NotFound(id.to_string()))?;
        if !old.is_terminal() {
            self.stop_worker(id, true, None).await?;
        }

        let town = self
            .store
            .get_town(&old.town_id)?
            .ok_or_else(|| CoordError::UnknownTown(old.town_id.to_string()))?;
        let config = self.config_for_town(&town);
        let record = self.build_record(
            &town,
            old.role,
            old.instance,
            0,
            Some(old.id.clone()),
            old.auto_restart,
        );
        self.launch(record, &town, &config).await
    }

    /// Policy respawn of a failed worker. Returns `Ok(None)` when the
    /// respawn is no longer applicable (drain started, record changed, or
    /// the slot was refilled manually).
    pub async fn respawn_from(
        &self,
        failed_id: &WorkerId,
        restart_count: u32,
    ) -> Result<Option<WorkerRecord>, CoordError> {
        if self.is_draining() {
            return Ok(None);
        }
        let Some(failed) = self.store.get_worker(failed_id)? else {
            return Ok(None);
        };
        if failed.status != WorkerStatus::Failed || !failed.auto_restart {
            return Ok(None);
        }
        let Some(town) = self.store.get_town(&failed.town_id)? else {
            return Ok(None);
        };

        let config = self.config_for_town(&town);
        let record = self.build_record(
            &town,
            failed.role,
            failed.instance,
            restart_count,
            Some(failed.id.clone()),
            failed.auto_restart,
        );

        match self.launch(record, &town, &config).await {
            Ok(worker) => {
                info!(
                    worker_id = %worker.id,
                    predecessor = %failed.id,
                    restart_count,
                    "worker respawned"
                );
                Ok(Some(worker))
            }
            Err(CoordError::SlotBusy { .. }) => {
                // Someone refilled the slot while the backoff ran
                Ok(None)
            }
            Err(CoordError::SpawnFailed(msg)) => {
                // The replacement is FAILED on disk; let the policy decide
                // whether to try again
                if let Ok(Some(replacement)) = self.latest_failed_successor(failed_id) {
                    self.notify_failure(&replacement.id, true);
                }
                Err(CoordError::SpawnFailed(msg))
            }
            Err(e) => Err(e),
        }
    }

    fn latest_failed_successor(
        &self,
        predecessor: &WorkerId,
    ) -> Result<Option<WorkerRecord>, CoordError> {
        let all = self.store.list_workers(&WorkerFilter::default())?;
        Ok(all.into_iter().find(|w| {
            w.predecessor.as_ref() == Some(predecessor) && w.status == WorkerStatus::Failed
        }))
    }

    async fn wait_starting_resolution(&self, id: &WorkerId) -> Result<(), CoordError> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(STARTUP_TIMEOUT_MS + 5_000);
        loop {
            let Some(worker) = self.store.get_worker(id)? else {
                return Ok(());
            };
            if worker.status != WorkerStatus::Starting
                || tokio::time::Instant::now() >= deadline
            {
                return Ok(());
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Poll until the process exits or `timeout_secs` elapses.
    /// `Some(exit_code)` on exit, `None` while still alive at the deadline.
    async fn wait_exit(&self, pid: u32, timeout_secs: u64) -> Option<Option<i32>> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            match self.procs.poll(pid) {
                ProcessStatus::Exited { exit_code } => return Some(exit_code),
                ProcessStatus::Gone => return Some(None),
                ProcessStatus::Alive => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    fn finish_terminal(&self, worker: &WorkerRecord) {
        heartbeat::remove(&worker.heartbeat_path);
        self.misses.lock().remove(&worker.id);
    }

    fn must_get(&self, id: &WorkerId) -> Result<WorkerRecord, CoordError> {
        self.store
            .get_worker(id)?
            .ok_or_else(|| CoordError::NotFound(id.to_string()))
    }

    // ── Health ──────────────────────────────────────────────────────────

    /// One health sweep over all STARTING/RUNNING workers.
    pub async fn poll_health(&self) -> Result<(), CoordError> {
        let workers = self.store.non_terminal_workers()?;
        let mut configs: HashMap<String, MabConfig> = HashMap::new();

        for worker in workers {
            if !matches!(
                worker.status,
                WorkerStatus::Starting | WorkerStatus::Running
            ) {
                continue;
            }
            let config = match configs.entry(worker.town_id.to_string()) {
                std::collections::hash_map::Entry::Occupied(e) => e.get().clone(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(self.config_for(&worker)).clone()
                }
            };
            self.check_worker(&worker.id, &config).await?;
        }
        Ok(())
    }

    async fn check_worker(&self, id: &WorkerId, config: &MabConfig) -> Result<(), CoordError> {
        // A held lock means a stop or restart is mid-flight; skip this
        // worker for the tick rather than stalling the whole sweep.
        let lock = self.lock_for(id);
        let Ok(_guard) = lock.try_lock() else {
            return Ok(());
        };

        let Some(worker) = self.store.get_worker(id)? else {
            return Ok(());
        };
        if !matches!(
            worker.status,
            WorkerStatus::Starting | WorkerStatus::Running
        ) {
            return Ok(());
        }

        let now = self.clock.now_ms();

        // Process existence first
        if let Some(pid) = worker.pid {
            match self.procs.poll(pid) {
                ProcessStatus::Exited { exit_code } => {
                    return self.fail_worker(&worker, now, "process exited", exit_code);
                }
                ProcessStatus::Gone => {
                    return self.fail_worker(&worker, now, "process exited", None);
                }
                ProcessStatus::Alive => {}
            }
        }

        let heartbeat_mtime = heartbeat::mtime_ms(&worker.heartbeat_path);
        let started_age = worker
            .started_at_ms
            .map(|t| now.saturating_sub(t))
            .unwrap_or(u64::MAX);

        match worker.status {
            WorkerStatus::Starting => {
                if let Some(mtime) = heartbeat_mtime {
                    self.store.mark_running(&worker.id, Some(mtime))?;
                    self.misses.lock().remove(&worker.id);
                    info!(worker_id = %worker.id, "worker running (heartbeat observed)");
                } else if started_age > STARTUP_TIMEOUT_MS {
                    return self.fail_worker(&worker, now, "startup timeout", None);
                } else if worker.pid.is_some() && started_age > STARTING_GRACE_MS {
                    self.store.mark_running(&worker.id, None)?;
                    info!(worker_id = %worker.id, "worker running (alive past grace)");
                }
            }
            WorkerStatus::Running => {
                let timeout_ms = config.health_check.heartbeat_timeout_seconds * 1000;
                let fresh = heartbeat_mtime
                    .map(|mtime| now.saturating_sub(mtime) <= timeout_ms)
                    .unwrap_or(false);
                if fresh {
                    self.misses.lock().remove(&worker.id);
                    if let Some(mtime) = heartbeat_mtime {
                        if worker.last_heartbeat_ms != Some(mtime) {
                            self.store.record_heartbeat(&worker.id, mtime)?;
                        }
                    }
                } else {
                    let missed = {
                        let mut misses = self.misses.lock();
                        let entry = misses.entry(worker.id.clone()).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    if missed >= config.health_check.unhealthy_threshold {
                        return self.fail_worker(&worker, now, "heartbeat lost", None);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn fail_worker(
        &self,
        worker: &WorkerRecord,
        now: u64,
        reason: &str,
        exit_code: Option<i32>,
    ) -> Result<(), CoordError> {
        self.store
            .mark_failed(&worker.id, now, reason, exit_code)?;
        if let Some(pid) = worker.pid {
            self.procs.forget(pid);
        }
        self.finish_terminal(worker);
        warn!(worker_id = %worker.id, reason, exit_code, "worker failed");
        self.notify_failure(&worker.id, true);
        Ok(())
    }

    // ── Reconciliation ──────────────────────────────────────────────────

    /// Resolve persisted records against OS reality after a daemon start.
    /// A live, verified pid stays RUNNING; everything else is FAILED
    /// ("orphaned") and handed to the restart supervisor.
    pub async fn reconcile(&self) -> Result<ReconcileSummary, CoordError> {
        let mut summary = ReconcileSummary::default();
        for worker in self.store.non_terminal_workers()? {
            let alive = worker
                .pid
                .map(|pid| {
                    matches!(self.procs.poll(pid), ProcessStatus::Alive)
                        && self.procs.verify_owner(pid, &worker.id)
                })
                .unwrap_or(false);

            if alive {
                self.store.mark_running(&worker.id, None)?;
                summary.confirmed_running += 1;
            } else {
                self.store
                    .mark_failed(&worker.id, self.clock.now_ms(), "orphaned", None)?;
                self.finish_terminal(&worker);
                self.notify_failure(&worker.id, true);
                summary.orphaned += 1;
            }
        }
        if summary.confirmed_running > 0 || summary.orphaned > 0 {
            info!(
                running = summary.confirmed_running,
                orphaned = summary.orphaned,
                "reconciled persisted workers"
            );
        }
        Ok(summary)
    }

    // ── Drain ───────────────────────────────────────────────────────────

    /// Stop every live worker for daemon shutdown. Workers that exit within
    /// the grace period end STOPPED; survivors are killed and end FAILED
    /// ("force killed on shutdown"). With `graceful` false the grace phase
    /// is skipped.
    pub async fn drain(&self, graceful: bool) -> Result<(), CoordError> {
        self.set_draining();

        let mut pending = Vec::new();
        for worker in self.store.non_terminal_workers()? {
            let lock = self.lock_for(&worker.id);
            let _guard = lock.lock().await;
            let Some(current) = self.store.get_worker(&worker.id)? else {
                continue;
            };
            if current.is_terminal() {
                continue;
            }
            self.store.mark_stopping(&current.id)?;
            match current.pid {
                Some(pid) => {
                    if graceful {
                        let _ = self.procs.signal(pid, StopSignal::Term);
                    }
                    pending.push(current);
                }
                None => {
                    self.store
                        .mark_stopped(&current.id, self.clock.now_ms(), None)?;
                    self.finish_terminal(&current);
                }
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let config = self.resolver.effective(None, None);

        if graceful {
            let deadline = tokio::time::Instant::now()
                + Duration::from_secs(config.shutdown.worker_grace_seconds);
            pending = self.reap_until(pending, deadline, false).await?;
        }

        if !pending.is_empty() {
            for worker in &pending {
                if let Some(pid) = worker.pid {
                    let _ = self.procs.signal(pid, StopSignal::Kill);
                }
            }
            let deadline = tokio::time::Instant::now()
                + Duration::from_secs(config.shutdown.force_kill_timeout_seconds);
            let survivors = self.reap_until(pending, deadline, true).await?;
            for worker in survivors {
                // Even SIGKILL did not confirm an exit in time
                self.store.mark_failed(
                    &worker.id,
                    self.clock.now_ms(),
                    "force killed on shutdown",
                    None,
                )?;
                self.finish_terminal(&worker);
            }
        }
        Ok(())
    }

    /// Sweep `pending` until everything exited or the deadline passes,
    /// marking exits as they are observed. Returns the survivors.
    async fn reap_until(
        &self,
        mut pending: Vec<WorkerRecord>,
        deadline: tokio::time::Instant,
        killed: bool,
    ) -> Result<Vec<WorkerRecord>, CoordError> {
        loop {
            let mut still_alive = Vec::new();
            for worker in pending {
                let Some(pid) = worker.pid else { continue };
                match self.procs.poll(pid) {
                    ProcessStatus::Exited { exit_code } => {
                        if killed {
                            self.store.mark_failed(
                                &worker.id,
                                self.clock.now_ms(),
                                "force killed on shutdown",
                                exit_code,
                            )?;
                        } else {
                            self.store
                                .mark_stopped(&worker.id, self.clock.now_ms(), exit_code)?;
                        }
                        self.procs.forget(pid);
                        self.finish_terminal(&worker);
                    }
                    ProcessStatus::Gone => {
                        if killed {
                            self.store.mark_failed(
                                &worker.id,
                                self.clock.now_ms(),
                                "force killed on shutdown",
                                None,
                            )?;
                        } else {
                            self.store
                                .mark_stopped(&worker.id, self.clock.now_ms(), None)?;
                        }
                        self.finish_terminal(&worker);
                    }
                    ProcessStatus::Alive => still_alive.push(worker),
                }
            }
            pending = still_alive;
            if pending.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(pending);
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
