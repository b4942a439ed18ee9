// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::Request;
use crate::protocol_wire;
use crate::test_support::TestBed;
use mab_adapters::FakeProcessAdapter;
use mab_core::{ErrorKind, FakeClock};
use serde_json::{json, Value};

fn ctx_for(bed: &TestBed) -> ListenCtx<FakeProcessAdapter, FakeClock> {
    ListenCtx::new(
        Arc::clone(&bed.coordinator),
        Arc::new(Notify::new()),
        Arc::new(AtomicBool::new(false)),
    )
}

fn request(method: &str, params: Value) -> Request {
    Request {
        id: format!("req-{method}"),
        method: method.to_string(),
        params,
    }
}

async fn call(
    ctx: &ListenCtx<FakeProcessAdapter, FakeClock>,
    method: &str,
    params: Value,
) -> Response {
    serve_request(ctx, request(method, params)).await
}

fn error_code(response: &Response) -> i32 {
    response.error.as_ref().expect("expected error").code
}

fn result(response: &Response) -> &Value {
    response.result.as_ref().expect("expected result")
}

#[tokio::test]
async fn unknown_method_and_bad_params() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);

    let response = call(&ctx, "worker.levitate", Value::Null).await;
    assert_eq!(response.id, "req-worker.levitate");
    assert_eq!(error_code(&response), ErrorKind::MethodNotFound.code());

    let response = call(&ctx, "worker.spawn", json!({ "town": "/p" })).await;
    assert_eq!(error_code(&response), ErrorKind::InvalidParams.code());

    let response = call(&ctx, "worker.spawn", json!({ "role": "devops" })).await;
    assert_eq!(error_code(&response), ErrorKind::InvalidRole.code());
}

#[tokio::test]
async fn spawn_list_get_round_trip() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);

    let response = call(
        &ctx,
        "worker.spawn",
        json!({ "role": "developer", "town": bed.town_selector() }),
    )
    .await;
    let spawned = result(&response);
    let worker_id = spawned["worker_id"].as_str().unwrap().to_string();
    assert!(worker_id.starts_with("worker-developer-"));
    assert_eq!(spawned["status"], "starting");
    assert!(spawned["pid"].as_u64().is_some());

    // Every listed worker agrees with worker.get
    let response = call(&ctx, "worker.list", json!({})).await;
    let workers = result(&response)["workers"].as_array().unwrap().clone();
    assert_eq!(workers.len(), 1);
    for listed in &workers {
        let id = listed["id"].as_str().unwrap();
        let got = call(&ctx, "worker.get", json!({ "worker_id": id })).await;
        assert_eq!(&result(&got)["worker"], listed);
    }

    let response = call(&ctx, "worker.get", json!({ "worker_id": "worker-qa-nope" })).await;
    assert_eq!(error_code(&response), ErrorKind::NotFound.code());
}

#[tokio::test]
async fn list_filters_by_role_and_status() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let dev = bed.spawn(mab_core::WorkerRole::Developer).await;
    bed.spawn(mab_core::WorkerRole::Qa).await;
    bed.promote(&dev).await;

    let response = call(&ctx, "worker.list", json!({ "role": "developer" })).await;
    assert_eq!(result(&response)["workers"].as_array().unwrap().len(), 1);

    let response = call(&ctx, "worker.list", json!({ "status": "running" })).await;
    let running = result(&response)["workers"].as_array().unwrap().clone();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0]["id"].as_str().unwrap(), dev.id.as_str());

    // Unknown town filter matches nothing rather than erroring
    let response = call(&ctx, "worker.list", json!({ "town": "atlantis" })).await;
    assert!(result(&response)["workers"].as_array().unwrap().is_empty());

    let response = call(&ctx, "worker.list", json!({ "status": "zombie" })).await;
    assert_eq!(error_code(&response), ErrorKind::InvalidParams.code());
}

#[tokio::test]
async fn capacity_surfaces_over_rpc() {
    let bed = TestBed::with_configs(None, Some("max_workers_per_town: 2\n"));
    let ctx = ctx_for(&bed);
    let spawn = json!({ "role": "qa", "town": bed.town_selector() });

    assert!(call(&ctx, "worker.spawn", spawn.clone()).await.error.is_none());
    assert!(call(&ctx, "worker.spawn", spawn.clone()).await.error.is_none());
    let third = call(&ctx, "worker.spawn", spawn).await;
    assert_eq!(error_code(&third), ErrorKind::Capacity.code());

    let response = call(&ctx, "worker.list", json!({ "role": "qa" })).await;
    let workers = result(&response)["workers"].as_array().unwrap().clone();
    let live = workers
        .iter()
        .filter(|w| w["status"] != "stopped" && w["status"] != "failed")
        .count();
    assert_eq!(live, 2);
}

#[tokio::test]
async fn stop_is_idempotent_over_rpc() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let worker = bed.spawn(mab_core::WorkerRole::Developer).await;
    bed.promote(&worker).await;

    let response = call(
        &ctx,
        "worker.stop",
        json!({ "worker_id": worker.id, "timeout_seconds": 5 }),
    )
    .await;
    assert_eq!(result(&response)["status"], "stopped");

    let again = call(&ctx, "worker.stop", json!({ "worker_id": worker.id })).await;
    assert_eq!(error_code(&again), ErrorKind::AlreadyTerminal.code());
}

#[tokio::test]
async fn restart_returns_the_new_record() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let worker = bed.spawn(mab_core::WorkerRole::Developer).await;
    bed.promote(&worker).await;

    let response = call(&ctx, "worker.restart", json!({ "worker_id": worker.id })).await;
    let new_id = result(&response)["new_worker_id"].as_str().unwrap();
    assert_ne!(new_id, worker.id.as_str());
    assert!(result(&response)["pid"].as_u64().is_some());
}

#[tokio::test]
async fn town_create_get_delete_flow() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let path = bed.town_selector();

    let response = call(&ctx, "town.create", json!({ "name": "alpha", "path": path })).await;
    let town_id = result(&response)["town_id"].as_str().unwrap().to_string();

    // Same path, different name: duplicate
    let dup = call(&ctx, "town.create", json!({ "name": "beta", "path": path })).await;
    assert_eq!(error_code(&dup), ErrorKind::Duplicate.code());

    let got = call(&ctx, "town.get", json!({ "town_id_or_name": "alpha" })).await;
    assert_eq!(result(&got)["town"]["id"].as_str().unwrap(), town_id);
    // Path canonicalisation round-trips through create/get
    assert_eq!(
        result(&got)["town"]["path"].as_str().unwrap(),
        std::fs::canonicalize(&path).unwrap().to_string_lossy()
    );

    let missing = call(&ctx, "town.get", json!({ "town_id_or_name": "atlantis" })).await;
    assert_eq!(error_code(&missing), ErrorKind::NotFound.code());

    // A live worker blocks deletion without force
    bed.spawn(mab_core::WorkerRole::Developer).await;
    let blocked = call(&ctx, "town.delete", json!({ "town_id_or_name": "alpha" })).await;
    assert_eq!(error_code(&blocked), ErrorKind::HasLiveWorkers.code());

    let forced = call(
        &ctx,
        "town.delete",
        json!({ "town_id_or_name": "alpha", "force": true }),
    )
    .await;
    assert_eq!(result(&forced)["deleted"], true);

    let gone = call(&ctx, "town.list", json!({})).await;
    assert!(result(&gone)["towns"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn daemon_status_reports_counts() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let worker = bed.spawn(mab_core::WorkerRole::Developer).await;
    bed.promote(&worker).await;
    bed.spawn(mab_core::WorkerRole::Qa).await;

    let response = call(&ctx, "daemon.status", Value::Null).await;
    let status = result(&response);
    assert!(status["uptime"].as_u64().is_some());
    assert_eq!(status["workers_by_status"]["running"], 1);
    assert_eq!(status["workers_by_status"]["starting"], 1);
    let towns = status["towns"].as_array().unwrap();
    assert_eq!(towns.len(), 1);
    assert_eq!(towns[0]["live_workers"], 2);
}

#[tokio::test]
async fn daemon_shutdown_wakes_the_main_loop() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);

    let response = call(&ctx, "daemon.shutdown", Value::Null).await;
    assert_eq!(result(&response)["accepted"], true);
    assert!(!ctx.force_shutdown.load(std::sync::atomic::Ordering::SeqCst));
    // The notify was signalled
    tokio::time::timeout(
        std::time::Duration::from_millis(100),
        ctx.shutdown_requested.notified(),
    )
    .await
    .expect("shutdown_requested not notified");

    let response = call(&ctx, "daemon.shutdown", json!({ "graceful": false })).await;
    assert_eq!(result(&response)["accepted"], true);
    assert!(ctx.force_shutdown.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn draining_daemon_rejects_requests() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    bed.coordinator.set_draining();

    let response = call(&ctx, "town.list", Value::Null).await;
    assert_eq!(error_code(&response), ErrorKind::ShuttingDown.code());
}

// ── Socket-level tests ──────────────────────────────────────────────────

async fn rpc_over_socket(
    stream: &mut tokio::net::UnixStream,
    request: &Request,
) -> Result<Response, protocol_wire::ProtocolError> {
    let data = protocol_wire::encode(request)?;
    protocol_wire::write_message(stream, &data).await?;
    let bytes = protocol_wire::read_message(stream).await?;
    protocol_wire::decode(&bytes)
}

#[tokio::test]
async fn requests_round_trip_over_a_unix_socket() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let socket_path = bed.home.path().join("mab.sock");
    let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(run(listener, ctx, Arc::clone(&shutdown)));

    let mut stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();

    // Multiple requests on one connection, ids correlate
    let response = rpc_over_socket(&mut stream, &request("town.list", Value::Null))
        .await
        .unwrap();
    assert_eq!(response.id, "req-town.list");
    assert!(response.result.is_some());

    let response = rpc_over_socket(&mut stream, &request("worker.list", json!({})))
        .await
        .unwrap();
    assert_eq!(response.id, "req-worker.list");

    shutdown.notify_waiters();
}

#[tokio::test]
async fn oversize_frame_gets_error_then_close() {
    let bed = TestBed::new();
    let ctx = ctx_for(&bed);
    let socket_path = bed.home.path().join("mab.sock");
    let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(run(listener, ctx, Arc::clone(&shutdown)));

    let mut stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();

    // Claim a payload over the limit; the daemon answers and closes
    use tokio::io::AsyncWriteExt;
    stream
        .write_all(&((protocol_wire::MAX_MESSAGE_SIZE as u32) + 1).to_be_bytes())
        .await
        .unwrap();

    let bytes = protocol_wire::read_message(&mut stream).await.unwrap();
    let response: Response = protocol_wire::decode(&bytes).unwrap();
    assert_eq!(
        response.error.unwrap().code,
        ErrorKind::ProtocolError.code()
    );

    // Connection is closed afterwards
    let err = protocol_wire::read_message(&mut stream).await.unwrap_err();
    assert!(matches!(err, protocol_wire::ProtocolError::ConnectionClosed));

    shutdown.notify_waiters();
}
