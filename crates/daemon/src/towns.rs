// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Town registry.
//!
//! Town identity is the canonical absolute path; names are labels. A
//! selector resolves as id, then name, then (for absolute paths) the
//! canonicalised path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mab_core::{Clock, TownId, TownRecord, UuidIdGen};
use mab_storage::{Store, StoreError};
use tracing::info;

use crate::coordinator::CoordError;

pub struct TownRegistry<C: Clock> {
    store: Arc<Store>,
    clock: C,
    ids: UuidIdGen,
}

impl<C: Clock> TownRegistry<C> {
    pub fn new(store: Arc<Store>, clock: C) -> Self {
        Self {
            store,
            clock,
            ids: UuidIdGen,
        }
    }

    /// Create a town from user input. The path must exist and canonicalise
    /// to an absolute directory; duplicates (by canonical path) are
    /// rejected regardless of name.
    pub fn create(
        &self,
        name: &str,
        path: &str,
        config_overrides: Option<serde_json::Value>,
    ) -> Result<TownRecord, CoordError> {
        if name.is_empty() {
            return Err(CoordError::InvalidPath("town name must not be empty".into()));
        }
        let canonical = canonicalize_town_path(path)?;
        self.register(name.to_string(), canonical, config_overrides)
    }

    /// Register an already-canonical path (also used by spawn auto-create).
    pub fn register(
        &self,
        name: String,
        canonical: PathBuf,
        config_overrides: Option<serde_json::Value>,
    ) -> Result<TownRecord, CoordError> {
        let town = TownRecord {
            id: TownId::generate(&self.ids),
            name,
            path: canonical,
            created_at_ms: self.clock.now_ms(),
            config_overrides,
        };
        self.store.insert_town(&town).map_err(|e| match e {
            StoreError::DuplicateTownPath(path) => {
                CoordError::DuplicateTown(path.display().to_string())
            }
            other => CoordError::from(other),
        })?;
        info!(town_id = %town.id, name = %town.name, path = %town.path.display(), "town created");
        Ok(town)
    }

    /// Resolve a selector: town id, then name, then canonical path.
    pub fn resolve(&self, selector: &str) -> Result<Option<TownRecord>, CoordError> {
        if let Some(town) = self.store.get_town(&TownId::new(selector))? {
            return Ok(Some(town));
        }
        if let Some(town) = self.store.get_town_by_name(selector)? {
            return Ok(Some(town));
        }
        if selector.starts_with('/') {
            if let Ok(canonical) = std::fs::canonicalize(selector) {
                return Ok(self.store.get_town_by_path(&canonical)?);
            }
        }
        Ok(None)
    }

    pub fn list(&self) -> Result<Vec<TownRecord>, CoordError> {
        Ok(self.store.list_towns()?)
    }

    /// Count of non-terminal workers in a town.
    pub fn live_workers(&self, town: &TownRecord) -> Result<u32, CoordError> {
        Ok(self.store.count_non_terminal_in_town(&town.id)?)
    }

    /// Delete a town. The caller has already stopped (or chosen to force
    /// past) any live workers.
    pub fn delete(&self, town: &TownRecord) -> Result<bool, CoordError> {
        let deleted = self.store.delete_town(&town.id)?;
        if deleted {
            info!(town_id = %town.id, name = %town.name, "town deleted");
        }
        Ok(deleted)
    }
}

/// Canonicalise a town path from user input.
fn canonicalize_town_path(path: &str) -> Result<PathBuf, CoordError> {
    let raw = Path::new(path);
    if !raw.is_absolute() {
        return Err(CoordError::InvalidPath(format!(
            "town path must be absolute: {path}"
        )));
    }
    let canonical = std::fs::canonicalize(raw)
        .map_err(|e| CoordError::InvalidPath(format!("{path}: {e}")))?;
    if !canonical.is_dir() {
        return Err(CoordError::InvalidPath(format!(
            "town path is not a directory: {path}"
        )));
    }
    Ok(canonical)
}

#[cfg(test)]
#[path = "towns_tests.rs"]
mod tests;
