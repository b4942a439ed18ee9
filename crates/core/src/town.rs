// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Town records.
//!
//! A town is an isolated project context identified by its canonical
//! absolute filesystem path. The path is the uniqueness key; names are
//! labels and never imply renames.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::IdGen;

crate::define_id! {
    /// Unique identifier for a town, `town-<suffix>`.
    pub struct TownId;
}

impl TownId {
    pub fn generate(ids: &impl IdGen) -> Self {
        Self(format!("town-{}", ids.next()))
    }
}

/// Persistent record of one town.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TownRecord {
    pub id: TownId,
    pub name: String,
    /// Canonical absolute path; unique across towns.
    pub path: PathBuf,
    pub created_at_ms: u64,
    /// Structured config overrides supplied at creation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_overrides: Option<serde_json::Value>,
}
