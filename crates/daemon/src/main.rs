// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mabd - agent supervisor daemon
//!
//! Single-instance background process that owns the worker registry and
//! listens on a Unix socket for RPC commands. Started by the `mab` CLI;
//! not usually invoked directly.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mab_adapters::SubprocessAdapter;
use mab_core::{ConfigResolver, SystemClock};
use mab_daemon::coordinator::Coordinator;
use mab_daemon::lifecycle::{self, DaemonPaths, LifecycleError};
use mab_daemon::listener::{self, ListenCtx};
use mab_daemon::{env, health, supervisor};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

/// Exit code when another daemon instance holds the lock.
const EXIT_ALREADY_RUNNING: i32 = 2;

#[tokio::main]
async fn main() {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("mabd {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                println!("mabd {}", env!("CARGO_PKG_VERSION"));
                println!("mab agent supervisor daemon");
                println!();
                println!("USAGE:");
                println!("    mabd");
                println!();
                println!("The daemon is typically started by the `mab` CLI. It listens");
                println!("on a Unix socket under the mab home for RPC commands.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -V, --version    Print version information");
                return;
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: mabd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let paths = match DaemonPaths::resolve() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let resolver = ConfigResolver::new(&paths.home);
    if let Err(e) = resolver.check() {
        eprintln!("error: invalid global config: {e}");
        std::process::exit(1);
    }

    // Acquire the single-instance lock before touching anything else
    let guard = match lifecycle::acquire(&paths) {
        Ok(guard) => guard,
        Err(LifecycleError::LockFailed(_)) => {
            eprintln!("mabd is already running");
            if let Some(pid) = lifecycle::read_pid_file(&paths) {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(EXIT_ALREADY_RUNNING);
        }
        Err(e) => {
            eprintln!("error: failed to start daemon: {e}");
            std::process::exit(1);
        }
    };

    rotate_log_if_needed(&paths);
    write_startup_marker(&paths);
    let global_config = resolver.effective(None, None);
    let _log_guard = match setup_logging(&paths, &global_config) {
        Ok(log_guard) => log_guard,
        Err(e) => {
            eprintln!("error: failed to set up logging: {e}");
            std::process::exit(1);
        }
    };

    info!("starting daemon (pid {})", std::process::id());

    let store = match lifecycle::open_store(&paths) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            write_startup_error(&paths, &e);
            error!("failed to open store: {e}");
            guard.cleanup();
            std::process::exit(1);
        }
    };

    let (coordinator, failure_rx) = Coordinator::new(
        store,
        SubprocessAdapter::new(),
        SystemClock,
        resolver,
        paths.home.clone(),
    );

    // Resolve persisted workers against OS reality before serving clients
    if let Err(e) = coordinator.reconcile().await {
        error!("startup reconciliation failed: {e}");
        guard.cleanup();
        std::process::exit(1);
    }

    let socket = match lifecycle::bind_socket(&paths) {
        Ok(socket) => socket,
        Err(e) => {
            write_startup_error(&paths, &e);
            error!("failed to bind socket: {e}");
            guard.cleanup();
            std::process::exit(1);
        }
    };

    // Tasks stop on `shutdown`; the RPC handler wakes main via
    // `shutdown_requested` so graceful teardown runs in one place.
    let shutdown = Arc::new(Notify::new());
    let shutdown_requested = Arc::new(Notify::new());
    let force_shutdown = Arc::new(AtomicBool::new(false));

    supervisor::spawn_restart_supervisor(
        Arc::clone(&coordinator),
        failure_rx,
        Arc::clone(&shutdown),
    );
    health::spawn_health_monitor(
        Arc::clone(&coordinator),
        Arc::clone(&shutdown),
        Duration::from_secs(global_config.health_check.interval_seconds.max(1)),
    );

    let ctx = ListenCtx::new(
        Arc::clone(&coordinator),
        Arc::clone(&shutdown_requested),
        Arc::clone(&force_shutdown),
    );
    tokio::spawn(listener::run(socket, ctx, Arc::clone(&shutdown)));

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            guard.cleanup();
            std::process::exit(1);
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot install SIGINT handler: {e}");
            guard.cleanup();
            std::process::exit(1);
        }
    };

    info!("daemon ready, listening on {}", paths.socket_path.display());
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = shutdown_requested.notified() => info!("shutdown requested via RPC"),
    }

    // Stop accepting connections, cancel pending respawns, halt the sweep
    coordinator.set_draining();
    shutdown.notify_waiters();

    let graceful = !force_shutdown.load(Ordering::SeqCst);
    if let Err(e) = coordinator.drain(graceful).await {
        error!("drain failed: {e}");
    }

    guard.cleanup();
    info!("daemon stopped");
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` -> `daemon.log.1` -> `daemon.log.2` -> `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(paths: &DaemonPaths) {
    let size = match std::fs::metadata(&paths.log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = paths.log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(&paths.log_path, format!("{log_str}.1"));
}

/// Startup marker written before tracing is up, so the CLI can find where
/// the current startup attempt begins.
fn write_startup_marker(paths: &DaemonPaths) {
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "--- mabd: starting (pid: {}) ---\n", std::process::id());
}

/// Write a startup error synchronously so it is visible even if the
/// process exits before the non-blocking writer flushes.
fn write_startup_error(paths: &DaemonPaths, error: &LifecycleError) {
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {error}");
}

fn setup_logging(
    paths: &DaemonPaths,
    config: &mab_core::MabConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file_appender = tracing_appender::rolling::never(
        &paths.home,
        paths
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoHome)?,
    );
    let (non_blocking, log_guard) = tracing_appender::non_blocking(file_appender);

    // Precedence: MAB_LOG env override, then configured level
    let level = env::log_override().unwrap_or_else(|| config.log_level.to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(log_guard)
}
