// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite store for towns and workers.
//!
//! Single-writer discipline: only the lifecycle coordinator mutates worker
//! rows, so a plain mutex around the connection is enough. WAL mode keeps
//! concurrent readers cheap. A partial unique index guarantees at most one
//! non-terminal record per `(town, role, instance)` at the storage layer.

use std::path::{Path, PathBuf};

use mab_core::{TownId, TownRecord, WorkerId, WorkerRecord, WorkerRole, WorkerStatus};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS towns (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    path             TEXT NOT NULL UNIQUE,
    created_at_ms    INTEGER NOT NULL,
    config_overrides TEXT
);

CREATE TABLE IF NOT EXISTS workers (
    id                TEXT PRIMARY KEY,
    town_id           TEXT NOT NULL REFERENCES towns(id),
    role              TEXT NOT NULL,
    instance          INTEGER NOT NULL,
    pid               INTEGER,
    status            TEXT NOT NULL,
    started_at_ms     INTEGER,
    stopped_at_ms     INTEGER,
    last_heartbeat_ms INTEGER,
    exit_code         INTEGER,
    error_message     TEXT,
    restart_count     INTEGER NOT NULL DEFAULT 0,
    auto_restart      INTEGER NOT NULL DEFAULT 1,
    log_path          TEXT NOT NULL,
    heartbeat_path    TEXT NOT NULL,
    predecessor       TEXT
);

CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);
CREATE INDEX IF NOT EXISTS idx_workers_town ON workers(town_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_workers_live_slot
    ON workers(town_id, role, instance)
    WHERE status IN ('starting', 'running', 'stopping');

CREATE TABLE IF NOT EXISTS schema_info (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store is corrupt: {0}")]
    Corrupt(String),

    #[error("town path already registered: {0}")]
    DuplicateTownPath(PathBuf),

    #[error("{role} instance {instance} is busy")]
    InstanceBusy { role: WorkerRole, instance: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    fn from_open(e: rusqlite::Error, path: &Path) -> Self {
        if is_corruption(&e) {
            StoreError::Corrupt(format!("{}: {e}", path.display()))
        } else {
            StoreError::Sqlite(e)
        }
    }
}

fn is_corruption(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            )
    )
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Filters for listing workers.
#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    pub town_id: Option<TownId>,
    pub role: Option<WorkerRole>,
    pub status: Option<WorkerStatus>,
}

/// Handle to the workers database.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the store at `path`.
    ///
    /// Applies WAL journaling, a bounded busy timeout, and foreign keys,
    /// then runs a quick integrity check. Corruption fails fast.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::from_open(e, path))?;
        Self::bootstrap(conn, path)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn, Path::new(":memory:"))
    }

    fn bootstrap(conn: Connection, path: &Path) -> Result<Self, StoreError> {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(|e| StoreError::from_open(e, path))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(|e| StoreError::from_open(e, path))?;

        let check: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| StoreError::from_open(e, path))?;
        if check != "ok" {
            return Err(StoreError::Corrupt(format!("{}: {check}", path.display())));
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::from_open(e, path))?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| StoreError::from_open(e, path))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        let value: String = conn.query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get(0),
        )?;
        value
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("bad schema version: {value}")))
    }

    // ── Towns ───────────────────────────────────────────────────────────

    pub fn insert_town(&self, town: &TownRecord) -> Result<(), StoreError> {
        let overrides = town
            .config_overrides
            .as_ref()
            .map(|v| v.to_string());
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO towns (id, name, path, created_at_ms, config_overrides)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                town.id.as_str(),
                town.name,
                path_str(&town.path),
                town.created_at_ms as i64,
                overrides,
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                StoreError::DuplicateTownPath(town.path.clone())
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    pub fn get_town(&self, id: &TownId) -> Result<Option<TownRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, path, created_at_ms, config_overrides FROM towns WHERE id = ?1",
            params![id.as_str()],
            town_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_town_by_path(&self, path: &Path) -> Result<Option<TownRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, path, created_at_ms, config_overrides FROM towns WHERE path = ?1",
            params![path_str(path)],
            town_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_town_by_name(&self, name: &str) -> Result<Option<TownRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, path, created_at_ms, config_overrides FROM towns
             WHERE name = ?1 ORDER BY created_at_ms LIMIT 1",
            params![name],
            town_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_towns(&self) -> Result<Vec<TownRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, path, created_at_ms, config_overrides FROM towns
             ORDER BY created_at_ms",
        )?;
        let rows = stmt.query_map([], town_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_town(&self, id: &TownId) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        // Worker history goes with the town
        conn.execute("DELETE FROM workers WHERE town_id = ?1", params![id.as_str()])?;
        let n = conn.execute("DELETE FROM towns WHERE id = ?1", params![id.as_str()])?;
        Ok(n > 0)
    }

    // ── Workers ─────────────────────────────────────────────────────────

    pub fn insert_worker(&self, worker: &WorkerRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workers (
                id, town_id, role, instance, pid, status,
                started_at_ms, stopped_at_ms, last_heartbeat_ms,
                exit_code, error_message, restart_count, auto_restart,
                log_path, heartbeat_path, predecessor
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                worker.id.as_str(),
                worker.town_id.as_str(),
                worker.role.as_str(),
                worker.instance as i64,
                worker.pid.map(|p| p as i64),
                worker.status.as_str(),
                worker.started_at_ms.map(|v| v as i64),
                worker.stopped_at_ms.map(|v| v as i64),
                worker.last_heartbeat_ms.map(|v| v as i64),
                worker.exit_code,
                worker.error_message,
                worker.restart_count as i64,
                worker.auto_restart as i64,
                path_str(&worker.log_path),
                path_str(&worker.heartbeat_path),
                worker.predecessor.as_ref().map(|p| p.as_str()),
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                StoreError::InstanceBusy {
                    role: worker.role,
                    instance: worker.instance,
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    pub fn get_worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{SELECT_WORKER} WHERE id = ?1"),
            params![id.as_str()],
            worker_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_workers(&self, filter: &WorkerFilter) -> Result<Vec<WorkerRecord>, StoreError> {
        let mut clauses = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(town_id) = &filter.town_id {
            args.push(town_id.as_str().to_string());
            clauses.push(format!("town_id = ?{}", args.len()));
        }
        if let Some(role) = filter.role {
            args.push(role.as_str().to_string());
            clauses.push(format!("role = ?{}", args.len()));
        }
        if let Some(status) = filter.status {
            args.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", args.len()));
        }

        let mut sql = SELECT_WORKER.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY started_at_ms DESC, id");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), worker_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All workers in a non-terminal status.
    pub fn non_terminal_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_WORKER} WHERE status IN ('starting', 'running', 'stopping') ORDER BY id"
        ))?;
        let rows = stmt.query_map([], worker_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_non_terminal_in_town(&self, town_id: &TownId) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM workers
             WHERE town_id = ?1 AND status IN ('starting', 'running', 'stopping')",
            params![town_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }

    /// Instance numbers currently occupied by non-terminal workers.
    pub fn live_instances(
        &self,
        town_id: &TownId,
        role: WorkerRole,
    ) -> Result<Vec<u32>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT instance FROM workers
             WHERE town_id = ?1 AND role = ?2
               AND status IN ('starting', 'running', 'stopping')
             ORDER BY instance",
        )?;
        let rows = stmt.query_map(params![town_id.as_str(), role.as_str()], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_worker_pid(&self, id: &WorkerId, pid: u32) -> Result<(), StoreError> {
        self.update(id, "UPDATE workers SET pid = ?2 WHERE id = ?1", params![
            id.as_str(),
            pid as i64
        ])
    }

    /// Transition into `running`, optionally recording an observed heartbeat.
    pub fn mark_running(
        &self,
        id: &WorkerId,
        heartbeat_ms: Option<u64>,
    ) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE workers SET status = 'running',
                 last_heartbeat_ms = COALESCE(?2, last_heartbeat_ms)
             WHERE id = ?1",
            params![id.as_str(), heartbeat_ms.map(|v| v as i64)],
        )
    }

    pub fn record_heartbeat(&self, id: &WorkerId, heartbeat_ms: u64) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE workers SET last_heartbeat_ms = ?2 WHERE id = ?1",
            params![id.as_str(), heartbeat_ms as i64],
        )
    }

    pub fn mark_stopping(&self, id: &WorkerId) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE workers SET status = 'stopping' WHERE id = ?1",
            params![id.as_str()],
        )
    }

    /// Terminal transition into `stopped`; sets `stopped_at` and clears the pid.
    pub fn mark_stopped(
        &self,
        id: &WorkerId,
        stopped_at_ms: u64,
        exit_code: Option<i32>,
    ) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE workers SET status = 'stopped', stopped_at_ms = ?2,
                 exit_code = COALESCE(?3, exit_code), pid = NULL
             WHERE id = ?1",
            params![id.as_str(), stopped_at_ms as i64, exit_code],
        )
    }

    /// Terminal transition into `failed` with a diagnostic reason.
    pub fn mark_failed(
        &self,
        id: &WorkerId,
        stopped_at_ms: u64,
        reason: &str,
        exit_code: Option<i32>,
    ) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE workers SET status = 'failed', stopped_at_ms = ?2,
                 error_message = ?3, exit_code = COALESCE(?4, exit_code), pid = NULL
             WHERE id = ?1",
            params![id.as_str(), stopped_at_ms as i64, reason, exit_code],
        )
    }

    pub fn set_auto_restart(&self, id: &WorkerId, auto_restart: bool) -> Result<(), StoreError> {
        self.update(
            id,
            "UPDATE workers SET auto_restart = ?2 WHERE id = ?1",
            params![id.as_str(), auto_restart as i64],
        )
    }

    /// Worker counts per status, for the daemon status report.
    pub fn status_counts(&self) -> Result<Vec<(WorkerStatus, u64)>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM workers GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count as u64))
        })?;
        let mut counts = Vec::new();
        for row in rows {
            let (status, count) = row?;
            let status = status
                .parse::<WorkerStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            counts.push((status, count));
        }
        Ok(counts)
    }

    fn update(
        &self,
        id: &WorkerId,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(sql, args)?;
        if n == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

const SELECT_WORKER: &str = "SELECT id, town_id, role, instance, pid, status,
    started_at_ms, stopped_at_ms, last_heartbeat_ms, exit_code, error_message,
    restart_count, auto_restart, log_path, heartbeat_path, predecessor
    FROM workers";

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn town_from_row(row: &Row<'_>) -> rusqlite::Result<TownRecord> {
    let overrides: Option<String> = row.get(4)?;
    let config_overrides = match overrides {
        Some(text) => Some(
            serde_json::from_str(&text)
                .map_err(|e| conversion_error(4, Box::new(e)))?,
        ),
        None => None,
    };
    Ok(TownRecord {
        id: TownId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        path: PathBuf::from(row.get::<_, String>(2)?),
        created_at_ms: row.get::<_, i64>(3)? as u64,
        config_overrides,
    })
}

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<WorkerRecord> {
    let role: String = row.get(2)?;
    let status: String = row.get(5)?;
    Ok(WorkerRecord {
        id: WorkerId::new(row.get::<_, String>(0)?),
        town_id: TownId::new(row.get::<_, String>(1)?),
        role: role
            .parse::<WorkerRole>()
            .map_err(|e| conversion_error(2, Box::new(e)))?,
        instance: row.get::<_, i64>(3)? as u32,
        pid: row.get::<_, Option<i64>>(4)?.map(|p| p as u32),
        status: status
            .parse::<WorkerStatus>()
            .map_err(|e| conversion_error(5, Box::new(e)))?,
        started_at_ms: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
        stopped_at_ms: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
        last_heartbeat_ms: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
        exit_code: row.get(9)?,
        error_message: row.get(10)?,
        restart_count: row.get::<_, i64>(11)? as u32,
        auto_restart: row.get::<_, i64>(12)? != 0,
        log_path: PathBuf::from(row.get::<_, String>(13)?),
        heartbeat_path: PathBuf::from(row.get::<_, String>(14)?),
        predecessor: row.get::<_, Option<String>>(15)?.map(WorkerId::new),
    })
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
