// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration.
//!
//! Effective values for a town are resolved from, lowest to highest
//! precedence: built-in defaults, the global document at
//! `<mab_home>/config.yaml`, the per-project document at
//! `<town>/.mab/config.yaml`, and structured overrides stored on the town
//! record. Call-site arguments (e.g. `auto_restart` on spawn) are applied by
//! the caller on top of the resolved value.
//!
//! Scalars replace, lists replace wholesale, keyed sections merge shallowly.
//! Unknown keys are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

use crate::role::WorkerRole;

/// Daemon log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

/// `health_check` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub interval_seconds: u64,
    pub heartbeat_timeout_seconds: u64,
    /// Consecutive missed checks before a worker is failed.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            heartbeat_timeout_seconds: 30,
            unhealthy_threshold: 3,
        }
    }
}

/// `restart_policy` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicyConfig {
    pub enabled: bool,
    /// Respawns allowed within the cooldown window; 0 disables restarts.
    pub max_restarts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
    pub cooldown_seconds: u64,
}

impl Default for RestartPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: 5,
            backoff_base_seconds: 5,
            backoff_max_seconds: 300,
            cooldown_seconds: 3600,
        }
    }
}

/// `shutdown` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    pub worker_grace_seconds: u64,
    pub force_kill_timeout_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            worker_grace_seconds: 60,
            force_kill_timeout_seconds: 10,
        }
    }
}

/// Effective configuration for one town (or the daemon globally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MabConfig {
    pub max_workers_per_town: u32,
    pub auto_create_town: bool,
    pub default_roles: Vec<WorkerRole>,
    /// Program + leading args used to launch an agent process.
    pub agent_command: Vec<String>,
    pub health_check: HealthCheckConfig,
    pub restart_policy: RestartPolicyConfig,
    pub shutdown: ShutdownConfig,
    pub log_level: LogLevel,
}

impl Default for MabConfig {
    fn default() -> Self {
        Self {
            max_workers_per_town: 5,
            auto_create_town: true,
            default_roles: vec![WorkerRole::Developer, WorkerRole::Qa],
            agent_command: vec!["claude".to_string()],
            health_check: HealthCheckConfig::default(),
            restart_policy: RestartPolicyConfig::default(),
            shutdown: ShutdownConfig::default(),
            log_level: LogLevel::Info,
        }
    }
}

/// Errors reading a config document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl MabConfig {
    /// Apply one layer on top of the current values.
    ///
    /// Only recognized keys are read; anything else in the document is
    /// ignored. Section values merge key-by-key, so a layer naming only
    /// `health_check.interval_seconds` leaves the other health keys alone.
    pub fn apply(&mut self, doc: &Value) {
        apply_u32(&mut self.max_workers_per_town, doc, "max_workers_per_town");
        apply_bool(&mut self.auto_create_town, doc, "auto_create_town");

        if let Some(Value::Sequence(items)) = doc.get("default_roles") {
            self.default_roles = items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.parse::<WorkerRole>().ok())
                .collect();
        }

        if let Some(Value::Sequence(items)) = doc.get("agent_command") {
            let cmd: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect();
            if !cmd.is_empty() {
                self.agent_command = cmd;
            }
        }

        if let Some(section) = doc.get("health_check") {
            apply_u64(
                &mut self.health_check.interval_seconds,
                section,
                "interval_seconds",
            );
            apply_u64(
                &mut self.health_check.heartbeat_timeout_seconds,
                section,
                "heartbeat_timeout_seconds",
            );
            apply_u32(
                &mut self.health_check.unhealthy_threshold,
                section,
                "unhealthy_threshold",
            );
        }

        if let Some(section) = doc.get("restart_policy") {
            apply_bool(&mut self.restart_policy.enabled, section, "enabled");
            apply_u32(&mut self.restart_policy.max_restarts, section, "max_restarts");
            apply_u64(
                &mut self.restart_policy.backoff_base_seconds,
                section,
                "backoff_base_seconds",
            );
            apply_u64(
                &mut self.restart_policy.backoff_max_seconds,
                section,
                "backoff_max_seconds",
            );
            apply_u64(
                &mut self.restart_policy.cooldown_seconds,
                section,
                "cooldown_seconds",
            );
        }

        if let Some(section) = doc.get("shutdown") {
            apply_u64(
                &mut self.shutdown.worker_grace_seconds,
                section,
                "worker_grace_seconds",
            );
            apply_u64(
                &mut self.shutdown.force_kill_timeout_seconds,
                section,
                "force_kill_timeout_seconds",
            );
        }

        if let Some(level) = doc.get("log_level").and_then(Value::as_str) {
            if let Ok(parsed) = level.parse() {
                self.log_level = parsed;
            }
        }
    }
}

fn apply_u64(field: &mut u64, doc: &Value, key: &str) {
    if let Some(v) = doc.get(key).and_then(Value::as_u64) {
        *field = v;
    }
}

fn apply_u32(field: &mut u32, doc: &Value, key: &str) {
    if let Some(v) = doc.get(key).and_then(Value::as_u64) {
        if let Ok(v) = u32::try_from(v) {
            *field = v;
        }
    }
}

fn apply_bool(field: &mut bool, doc: &Value, key: &str) {
    if let Some(v) = doc.get(key).and_then(Value::as_bool) {
        *field = v;
    }
}

/// Resolves effective configuration for towns.
///
/// Documents are re-read on each query; both files are small and queries
/// are infrequent (spawn, health tick), so no caching is needed.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    mab_home: PathBuf,
}

impl ConfigResolver {
    pub fn new(mab_home: impl Into<PathBuf>) -> Self {
        Self {
            mab_home: mab_home.into(),
        }
    }

    pub fn global_path(&self) -> PathBuf {
        self.mab_home.join("config.yaml")
    }

    pub fn project_path(town_path: &Path) -> PathBuf {
        town_path.join(".mab").join("config.yaml")
    }

    /// Validate the global document, reporting read/parse errors.
    ///
    /// `effective` tolerates broken documents (skipping them); startup calls
    /// this once so a syntax error is surfaced instead of silently ignored.
    pub fn check(&self) -> Result<(), ConfigError> {
        load_yaml(&self.global_path()).map(|_| ())
    }

    /// Resolve the effective config for a town (or globally with `None`).
    pub fn effective(
        &self,
        town_path: Option<&Path>,
        town_overrides: Option<&serde_json::Value>,
    ) -> MabConfig {
        let mut config = MabConfig::default();

        if let Ok(Some(doc)) = load_yaml(&self.global_path()) {
            config.apply(&doc);
        }
        if let Some(town) = town_path {
            if let Ok(Some(doc)) = load_yaml(&Self::project_path(town)) {
                config.apply(&doc);
            }
        }
        if let Some(overrides) = town_overrides {
            if let Ok(doc) = serde_yaml::to_value(overrides) {
                config.apply(&doc);
            }
        }

        config
    }
}

/// Load a YAML document, `None` when the file does not exist.
pub fn load_yaml(path: &Path) -> Result<Option<Value>, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_yaml::from_str(&text)
        .map(Some)
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
