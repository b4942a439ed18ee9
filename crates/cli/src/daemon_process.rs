// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Starting and stopping the daemon process from the CLI.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::client::DaemonClient;

/// How long to wait for a freshly started daemon to accept connections.
const START_TIMEOUT: Duration = Duration::from_secs(5);
const START_POLL: Duration = Duration::from_millis(50);

/// Locate the `mabd` binary: next to the current executable, else $PATH.
fn daemon_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("mabd");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("mabd")
}

/// Start the daemon detached and wait for its socket to come up.
pub fn start_daemon(home: &Path, socket_path: PathBuf) -> Result<()> {
    let client = DaemonClient::new(socket_path);
    if client.probe() {
        bail!("daemon is already running");
    }

    let binary = daemon_binary();
    std::process::Command::new(&binary)
        .env("MAB_HOME", home)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("failed to start {}", binary.display()))?;

    let deadline = Instant::now() + START_TIMEOUT;
    while Instant::now() < deadline {
        if client.probe() {
            return Ok(());
        }
        std::thread::sleep(START_POLL);
    }
    bail!(
        "daemon did not come up within {}s; check {}/daemon.log",
        START_TIMEOUT.as_secs(),
        home.display()
    )
}

/// Ask a running daemon to shut down.
pub async fn stop_daemon(client: &DaemonClient, graceful: bool) -> Result<()> {
    client
        .call("daemon.shutdown", serde_json::json!({ "graceful": graceful }))
        .await?;
    Ok(())
}
