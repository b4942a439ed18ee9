// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mab_core::WorkerId;
use tempfile::TempDir;

fn spec(dir: &TempDir, command: Vec<&str>) -> SpawnSpec {
    SpawnSpec {
        worker_id: WorkerId::new("worker-developer-test01"),
        role: WorkerRole::Developer,
        town_path: dir.path().to_path_buf(),
        log_path: dir.path().join("w.log"),
        heartbeat_path: dir.path().join("hb"),
        prompt_path: dir.path().join("DEVELOPER.md"),
        command: command.into_iter().map(String::from).collect(),
    }
}

#[test]
fn env_carries_the_worker_contract() {
    let dir = TempDir::new().unwrap();
    let spec = spec(&dir, vec!["claude"]);
    let env = spec.env();
    let get = |k: &str| {
        env.iter()
            .find(|(key, _)| key == k)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(get("WORKER_ID"), "worker-developer-test01");
    assert_eq!(get("WORKER_ROLE"), "developer");
    assert_eq!(get("WORKER_TOWN"), dir.path().to_string_lossy());
    assert!(get("WORKER_HEARTBEAT_FILE").ends_with("/hb"));
    assert!(get("WORKER_PROMPT_FILE").ends_with("/DEVELOPER.md"));
}

#[tokio::test]
async fn spawn_reports_exit_code_via_poll() {
    let dir = TempDir::new().unwrap();
    let adapter = SubprocessAdapter::new();
    let pid = adapter
        .spawn(&spec(&dir, vec!["sh", "-c", "exit 7"]))
        .await
        .unwrap();

    // The child exits almost immediately; poll until reaped
    let mut status = ProcessStatus::Alive;
    for _ in 0..100 {
        status = adapter.poll(pid);
        if status != ProcessStatus::Alive {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(status, ProcessStatus::Exited { exit_code: Some(7) });
    // Exit stays observable until forgotten
    assert_eq!(
        adapter.poll(pid),
        ProcessStatus::Exited { exit_code: Some(7) }
    );
    adapter.forget(pid);
    assert_eq!(adapter.poll(pid), ProcessStatus::Gone);
}

#[tokio::test]
async fn spawn_redirects_output_to_log() {
    let dir = TempDir::new().unwrap();
    let adapter = SubprocessAdapter::new();
    let s = spec(&dir, vec!["sh", "-c", "echo out; echo err >&2"]);
    let pid = adapter.spawn(&s).await.unwrap();

    for _ in 0..100 {
        if adapter.poll(pid) != ProcessStatus::Alive {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let log = std::fs::read_to_string(&s.log_path).unwrap();
    assert!(log.contains("out"));
    assert!(log.contains("err"));
}

#[tokio::test]
async fn missing_binary_is_a_launch_failure() {
    let dir = TempDir::new().unwrap();
    let adapter = SubprocessAdapter::new();
    let err = adapter
        .spawn(&spec(&dir, vec!["definitely-not-a-real-binary-mab"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::LaunchFailed { .. }));
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let dir = TempDir::new().unwrap();
    let adapter = SubprocessAdapter::new();
    let err = adapter.spawn(&spec(&dir, vec![])).await.unwrap_err();
    assert!(matches!(err, ProcessError::EmptyCommand));
}

#[tokio::test]
async fn term_signal_stops_a_sleeping_child() {
    let dir = TempDir::new().unwrap();
    let adapter = SubprocessAdapter::new();
    let pid = adapter
        .spawn(&spec(&dir, vec!["sh", "-c", "sleep 30"]))
        .await
        .unwrap();

    assert_eq!(adapter.poll(pid), ProcessStatus::Alive);
    adapter.signal(pid, StopSignal::Term).unwrap();

    let mut status = ProcessStatus::Alive;
    for _ in 0..100 {
        status = adapter.poll(pid);
        if status != ProcessStatus::Alive {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    // Killed by signal: no exit code
    assert_eq!(status, ProcessStatus::Exited { exit_code: None });
    adapter.forget(pid);
}
