// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn codes_are_unique_and_reversible() {
    let kinds = [
        ErrorKind::AlreadyRunning,
        ErrorKind::InvalidRole,
        ErrorKind::UnknownTown,
        ErrorKind::Duplicate,
        ErrorKind::InvalidPath,
        ErrorKind::InvalidParams,
        ErrorKind::MethodNotFound,
        ErrorKind::Capacity,
        ErrorKind::NotFound,
        ErrorKind::AlreadyTerminal,
        ErrorKind::HasLiveWorkers,
        ErrorKind::SpawnFailed,
        ErrorKind::ShuttingDown,
        ErrorKind::StoreCorrupt,
        ErrorKind::ProtocolError,
        ErrorKind::Internal,
    ];
    for kind in kinds {
        assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
    }
    let mut codes: Vec<i32> = kinds.iter().map(|k| k.code()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), kinds.len());
}

#[test]
fn string_form_is_snake_case() {
    assert_eq!(ErrorKind::AlreadyTerminal.as_str(), "already_terminal");
    assert_eq!(
        serde_json::to_string(&ErrorKind::HasLiveWorkers).unwrap(),
        "\"has_live_workers\""
    );
}
