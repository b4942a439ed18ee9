// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mab_core::{WorkerId, WorkerRole};
use std::path::PathBuf;

fn spec(id: &str) -> SpawnSpec {
    SpawnSpec {
        worker_id: WorkerId::new(id),
        role: WorkerRole::Qa,
        town_path: PathBuf::from("/t"),
        log_path: PathBuf::from("/t/.mab/logs/w.log"),
        heartbeat_path: PathBuf::from("/t/.mab/heartbeat/w"),
        prompt_path: PathBuf::from("/home/u/.mab/prompts/QA.md"),
        command: vec!["agent".into()],
    }
}

#[tokio::test]
async fn spawn_hands_out_increasing_pids_and_records_specs() {
    let fake = FakeProcessAdapter::new();
    let a = fake.spawn(&spec("w-a")).await.unwrap();
    let b = fake.spawn(&spec("w-b")).await.unwrap();
    assert!(b > a);
    assert_eq!(fake.poll(a), ProcessStatus::Alive);
    assert_eq!(fake.spawned().len(), 2);
    assert_eq!(fake.spawned()[1].worker_id, WorkerId::new("w-b"));
}

#[tokio::test]
async fn spawn_error_fires_once() {
    let fake = FakeProcessAdapter::new();
    fake.set_spawn_error("no such binary");
    assert!(fake.spawn(&spec("w-a")).await.is_err());
    assert!(fake.spawn(&spec("w-b")).await.is_ok());
}

#[tokio::test]
async fn term_resolves_unless_ignored() {
    let fake = FakeProcessAdapter::new();
    let pid = fake.spawn(&spec("w-a")).await.unwrap();
    fake.signal(pid, StopSignal::Term).unwrap();
    assert_eq!(fake.poll(pid), ProcessStatus::Exited { exit_code: Some(0) });

    let stubborn = fake.spawn(&spec("w-b")).await.unwrap();
    fake.set_ignore_term(true);
    fake.signal(stubborn, StopSignal::Term).unwrap();
    assert_eq!(fake.poll(stubborn), ProcessStatus::Alive);
    fake.signal(stubborn, StopSignal::Kill).unwrap();
    assert_eq!(fake.poll(stubborn), ProcessStatus::Exited { exit_code: None });
    assert_eq!(fake.signals_sent(stubborn), 2);
}

#[tokio::test]
async fn unknown_pids_are_gone_and_presets_apply() {
    let fake = FakeProcessAdapter::new();
    assert_eq!(fake.poll(31337), ProcessStatus::Gone);
    fake.preset(31337, ProcessStatus::Alive);
    assert_eq!(fake.poll(31337), ProcessStatus::Alive);
    fake.vanish(31337);
    assert_eq!(fake.poll(31337), ProcessStatus::Gone);
}
