// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::SequentialIdGen;

#[test]
fn worker_id_format() {
    let ids = SequentialIdGen::new("abc123");
    let id = WorkerId::generate(WorkerRole::Developer, &ids);
    assert_eq!(id.as_str(), "worker-developer-abc1231");
}

#[test]
fn status_terminality() {
    assert!(!WorkerStatus::Starting.is_terminal());
    assert!(!WorkerStatus::Running.is_terminal());
    assert!(!WorkerStatus::Stopping.is_terminal());
    assert!(WorkerStatus::Stopped.is_terminal());
    assert!(WorkerStatus::Failed.is_terminal());
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&WorkerStatus::Starting).unwrap(),
        "\"starting\""
    );
    for status in [
        WorkerStatus::Starting,
        WorkerStatus::Running,
        WorkerStatus::Stopping,
        WorkerStatus::Stopped,
        WorkerStatus::Failed,
    ] {
        assert_eq!(status.as_str().parse::<WorkerStatus>().unwrap(), status);
    }
    assert!("crashed".parse::<WorkerStatus>().is_err());
}
