// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the RPC socket.
//!
//! Accepts connections and reads length-prefixed requests in a loop; each
//! request is dispatched on its own task under a bounded semaphore, so
//! responses on one connection may interleave in any order (correlated by
//! request id). Framing violations close the connection.

mod status;
mod towns;
mod workers;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mab_adapters::ProcessAdapter;
use mab_core::Clock;
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::protocol::{Request, Response, RpcError};
use crate::protocol_wire::{self, ProtocolError};

/// Default per-request deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Maximum concurrently executing requests.
pub const MAX_IN_FLIGHT: usize = 32;

/// Shared context for request handlers.
pub struct ListenCtx<P: ProcessAdapter, C: Clock> {
    pub coordinator: Arc<Coordinator<P, C>>,
    /// Wakes the main loop when a shutdown RPC arrives.
    pub shutdown_requested: Arc<Notify>,
    /// Set when the shutdown RPC asked for a non-graceful drain.
    pub force_shutdown: Arc<AtomicBool>,
    pub start_time: Instant,
    pub permits: Arc<Semaphore>,
}

impl<P: ProcessAdapter, C: Clock> Clone for ListenCtx<P, C> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            shutdown_requested: Arc::clone(&self.shutdown_requested),
            force_shutdown: Arc::clone(&self.force_shutdown),
            start_time: self.start_time,
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<P: ProcessAdapter, C: Clock> ListenCtx<P, C> {
    pub fn new(
        coordinator: Arc<Coordinator<P, C>>,
        shutdown_requested: Arc<Notify>,
        force_shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            coordinator,
            shutdown_requested,
            force_shutdown,
            start_time: Instant::now(),
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }
}

/// Run the accept loop until shutdown.
pub async fn run<P: ProcessAdapter, C: Clock>(
    listener: UnixListener,
    ctx: ListenCtx<P, C>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("listener stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, ctx).await {
                            Ok(()) | Err(ProtocolError::ConnectionClosed) => {
                                debug!("client disconnected");
                            }
                            Err(e) => debug!("connection error: {e}"),
                        }
                    });
                }
                Err(e) => error!("accept error: {e}"),
            }
        }
    }
}

/// Serve one connection until it closes or violates the protocol.
async fn handle_connection<P: ProcessAdapter, C: Clock>(
    stream: UnixStream,
    ctx: ListenCtx<P, C>,
) -> Result<(), ProtocolError> {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    loop {
        let bytes = match protocol_wire::read_message(&mut reader).await {
            Ok(bytes) => bytes,
            Err(e @ ProtocolError::MessageTooLarge { .. }) => {
                // Oversize frames are a protocol error: report and close
                let err = RpcError::new(mab_core::ErrorKind::ProtocolError, e.to_string());
                write_response(&writer, &Response::error("", &err)).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let request: Request = match protocol_wire::decode(&bytes) {
            Ok(request) => request,
            Err(e) => {
                let err = RpcError::new(mab_core::ErrorKind::ProtocolError, e.to_string());
                write_response(&writer, &Response::error("", &err)).await;
                return Err(e);
            }
        };

        let permit = match Arc::clone(&ctx.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Ok(()),
        };
        let ctx = ctx.clone();
        let writer = Arc::clone(&writer);
        tokio::spawn(async move {
            let _permit = permit;
            let response = serve_request(&ctx, request).await;
            write_response(&writer, &response).await;
        });
    }
}

async fn serve_request<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    request: Request,
) -> Response {
    let id = request.id.clone();

    if ctx.coordinator.is_draining() {
        return Response::error(id, &RpcError::shutting_down());
    }

    debug!(id = %id, method = %request.method, "request");
    let deadline = deadline_for(&request);
    match tokio::time::timeout(deadline, dispatch(ctx, request)).await {
        Ok(Ok(result)) => Response::ok(id, result),
        Ok(Err(e)) => Response::error(id, &e),
        Err(_) => Response::error(
            id,
            &RpcError::internal(format!("deadline exceeded after {}s", deadline.as_secs())),
        ),
    }
}

/// Long operations carry their own timeout; pad the RPC deadline past it.
fn deadline_for(request: &Request) -> Duration {
    match request.method.as_str() {
        "worker.stop" | "worker.restart" | "town.delete" => {
            let explicit = request
                .params
                .get("timeout_seconds")
                .and_then(|v| v.as_u64())
                .unwrap_or(60);
            DEFAULT_DEADLINE + Duration::from_secs(explicit + 15)
        }
        _ => DEFAULT_DEADLINE,
    }
}

/// Route a request to its handler.
async fn dispatch<P: ProcessAdapter, C: Clock>(
    ctx: &ListenCtx<P, C>,
    request: Request,
) -> Result<serde_json::Value, RpcError> {
    let params = request.params;
    match request.method.as_str() {
        "worker.spawn" => workers::spawn(ctx, params).await,
        "worker.stop" => workers::stop(ctx, params).await,
        "worker.restart" => workers::restart(ctx, params).await,
        "worker.list" => workers::list(ctx, params),
        "worker.get" => workers::get(ctx, params),
        "town.create" => towns::create(ctx, params),
        "town.list" => towns::list(ctx),
        "town.get" => towns::get(ctx, params),
        "town.delete" => towns::delete(ctx, params).await,
        "daemon.status" => status::status(ctx),
        "daemon.shutdown" => status::shutdown(ctx, params),
        method => Err(RpcError::method_not_found(method)),
    }
}

async fn write_response(
    writer: &Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    response: &Response,
) {
    let data = match protocol_wire::encode(response) {
        Ok(data) => data,
        Err(e) => {
            error!("cannot encode response: {e}");
            return;
        }
    };
    let mut writer = writer.lock().await;
    if let Err(e) = protocol_wire::write_message(&mut *writer, &data).await {
        debug!("cannot write response: {e}");
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
