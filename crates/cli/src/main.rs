// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mab - CLI for the agent supervisor daemon
//!
//! A thin client over the daemon's RPC socket; output is the daemon's JSON,
//! pretty-printed.

mod client;
mod daemon_process;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::client::{ClientError, DaemonClient};

#[derive(Parser)]
#[command(name = "mab", version, about = "Multi-agent worker supervisor")]
struct Cli {
    /// Override the mab home directory (default: $MAB_HOME or ~/.mab)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
    /// Spawn a worker
    Spawn {
        /// Worker role (developer, qa, tech_lead, manager, reviewer)
        role: String,
        /// Town path or name (optional with a single town)
        #[arg(long)]
        town: Option<String>,
        /// Explicit instance number (>= 1)
        #[arg(long)]
        instance: Option<u32>,
        /// Disable automatic restart on failure
        #[arg(long)]
        no_auto_restart: bool,
    },
    /// List workers
    List {
        #[arg(long)]
        town: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one worker
    Get { worker_id: String },
    /// Stop a worker
    Stop {
        worker_id: String,
        /// Kill immediately instead of terminating gracefully
        #[arg(long)]
        force: bool,
        /// Seconds to wait for a graceful exit
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Restart a worker (new record, restart count reset)
    Restart { worker_id: String },
    /// Town management
    Town {
        #[command(subcommand)]
        command: TownCommands,
    },
    /// Daemon status overview
    Status,
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon in the background
    Start,
    /// Stop the daemon
    Stop {
        /// Skip the worker grace period
        #[arg(long)]
        force: bool,
    },
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum TownCommands {
    /// Register a town
    Create {
        name: String,
        path: String,
    },
    /// List towns
    List,
    /// Show one town
    Get { town: String },
    /// Delete a town
    Delete {
        town: String,
        /// Delete even with live workers (stops them first)
        #[arg(long)]
        force: bool,
    },
}

fn mab_home(cli_home: &Option<PathBuf>) -> Result<PathBuf> {
    if let Some(home) = cli_home {
        return Ok(home.clone());
    }
    if let Ok(home) = std::env::var("MAB_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(home).join(".mab"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let home = mab_home(&cli.home)?;
    let client = DaemonClient::new(home.join("mab.sock"));

    match cli.command {
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                daemon_process::start_daemon(&home, home.join("mab.sock"))?;
                println!("daemon started");
                Ok(())
            }
            DaemonCommands::Stop { force } => {
                daemon_process::stop_daemon(&client, !force).await?;
                println!("daemon stopping");
                Ok(())
            }
            DaemonCommands::Status => print_call(&client, "daemon.status", json!({})).await,
        },
        Commands::Spawn {
            role,
            town,
            instance,
            no_auto_restart,
        } => {
            let mut params = json!({ "role": role });
            if let Some(town) = town {
                params["town"] = json!(town);
            }
            if let Some(instance) = instance {
                params["instance"] = json!(instance);
            }
            if no_auto_restart {
                params["auto_restart"] = json!(false);
            }
            print_call(&client, "worker.spawn", params).await
        }
        Commands::List { town, role, status } => {
            let mut params = json!({});
            if let Some(town) = town {
                params["town"] = json!(town);
            }
            if let Some(role) = role {
                params["role"] = json!(role);
            }
            if let Some(status) = status {
                params["status"] = json!(status);
            }
            print_call(&client, "worker.list", params).await
        }
        Commands::Get { worker_id } => {
            print_call(&client, "worker.get", json!({ "worker_id": worker_id })).await
        }
        Commands::Stop {
            worker_id,
            force,
            timeout,
        } => {
            let mut params = json!({ "worker_id": worker_id, "graceful": !force });
            if let Some(timeout) = timeout {
                params["timeout_seconds"] = json!(timeout);
            }
            print_call(&client, "worker.stop", params).await
        }
        Commands::Restart { worker_id } => {
            print_call(&client, "worker.restart", json!({ "worker_id": worker_id })).await
        }
        Commands::Town { command } => match command {
            TownCommands::Create { name, path } => {
                print_call(&client, "town.create", json!({ "name": name, "path": path })).await
            }
            TownCommands::List => print_call(&client, "town.list", json!({})).await,
            TownCommands::Get { town } => {
                print_call(&client, "town.get", json!({ "town_id_or_name": town })).await
            }
            TownCommands::Delete { town, force } => {
                print_call(
                    &client,
                    "town.delete",
                    json!({ "town_id_or_name": town, "force": force }),
                )
                .await
            }
        },
        Commands::Status => print_call(&client, "daemon.status", json!({})).await,
    }
}

async fn print_call(
    client: &DaemonClient,
    method: &str,
    params: serde_json::Value,
) -> Result<()> {
    match client.call(method, params).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(ClientError::Rpc { kind, code, message }) => {
            let label = kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| code.to_string());
            anyhow::bail!("{label}: {message}")
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
