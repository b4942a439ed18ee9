// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mab_daemon::protocol_wire;
use tempfile::TempDir;

#[tokio::test]
async fn missing_socket_is_daemon_not_running() {
    let dir = TempDir::new().unwrap();
    let client = DaemonClient::new(dir.path().join("mab.sock"));
    assert!(!client.probe());

    let err = client.call("daemon.status", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::DaemonNotRunning(_)));
}

#[tokio::test]
async fn call_round_trips_and_maps_errors() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("mab.sock");
    let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();

    // Minimal fake daemon: answer the first request with a result, the
    // second with a capacity error. The client opens one connection per
    // call.
    tokio::spawn(async move {
        for n in 0..2 {
            let (mut stream, _) = listener.accept().await.unwrap();
            let bytes = protocol_wire::read_message(&mut stream).await.unwrap();
            let request: Request = protocol_wire::decode(&bytes).unwrap();
            let response = if n == 0 {
                Response::ok(request.id, serde_json::json!({ "pong": true }))
            } else {
                Response::error(
                    request.id,
                    &mab_daemon::protocol::RpcError::new(ErrorKind::Capacity, "town full"),
                )
            };
            let data = protocol_wire::encode(&response).unwrap();
            protocol_wire::write_message(&mut stream, &data).await.unwrap();
        }
    });

    let client = DaemonClient::new(socket_path.clone());
    let result = client.call("daemon.status", serde_json::json!({})).await.unwrap();
    assert_eq!(result["pong"], true);

    let err = client
        .call("worker.spawn", serde_json::json!({ "role": "qa" }))
        .await
        .unwrap_err();
    match err {
        ClientError::Rpc { kind, message, .. } => {
            assert_eq!(kind, Some(ErrorKind::Capacity));
            assert_eq!(message, "town full");
        }
        other => panic!("expected Rpc error, got {other:?}"),
    }
}
