// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn request_params_default_to_null() {
    let req: Request = serde_json::from_str(r#"{"id":"1","method":"town.list"}"#).unwrap();
    assert_eq!(req.params, Value::Null);
}

#[test]
fn success_response_omits_error() {
    let resp = Response::ok("1", serde_json::json!({ "deleted": true }));
    let json = serde_json::to_string(&resp).unwrap();
    assert!(json.contains("\"result\""));
    assert!(!json.contains("\"error\""));
}

#[test]
fn stop_params_default_graceful() {
    let p: StopParams =
        parse_params(serde_json::json!({ "worker_id": "worker-qa-1" })).unwrap();
    assert!(p.graceful);
    assert_eq!(p.timeout_seconds, None);

    let p: StopParams = parse_params(serde_json::json!({
        "worker_id": "worker-qa-1", "graceful": false, "timeout_seconds": 2
    }))
    .unwrap();
    assert!(!p.graceful);
    assert_eq!(p.timeout_seconds, Some(2));
}

#[test]
fn missing_required_param_is_invalid_params() {
    let err = parse_params::<SpawnParams>(serde_json::json!({ "town": "/p" })).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParams);
}

#[test]
fn wrong_param_type_is_invalid_params() {
    let err =
        parse_params::<StopParams>(serde_json::json!({ "worker_id": 42 })).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidParams);
}
