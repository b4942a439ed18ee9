// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{Request, Response};

#[tokio::test]
async fn round_trips_a_request() {
    let req = Request {
        id: "req-1".into(),
        method: "worker.list".into(),
        params: serde_json::json!({ "role": "qa" }),
    };
    let data = encode(&req).unwrap();

    let mut buf = Vec::new();
    write_message(&mut buf, &data).await.unwrap();
    assert_eq!(&buf[..4], &(data.len() as u32).to_be_bytes());

    let mut reader = std::io::Cursor::new(buf);
    let bytes = read_message(&mut reader).await.unwrap();
    let decoded: Request = decode(&bytes).unwrap();
    assert_eq!(decoded, req);
}

#[tokio::test]
async fn oversize_length_prefix_is_rejected_without_reading_payload() {
    let mut frame = Vec::new();
    frame.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_be_bytes());
    // No payload follows; the reader must bail on the prefix alone
    let mut reader = std::io::Cursor::new(frame);
    let err = read_message(&mut reader).await.unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
}

#[tokio::test]
async fn oversize_encode_is_rejected() {
    let big = "x".repeat(MAX_MESSAGE_SIZE + 1);
    let err = encode(&big).unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
}

#[tokio::test]
async fn eof_reads_as_connection_closed() {
    let mut reader = std::io::Cursor::new(Vec::<u8>::new());
    assert!(matches!(
        read_message(&mut reader).await.unwrap_err(),
        ProtocolError::ConnectionClosed
    ));

    // Truncated payload is also a closed connection
    let mut frame = Vec::new();
    frame.extend_from_slice(&8u32.to_be_bytes());
    frame.extend_from_slice(b"abc");
    let mut reader = std::io::Cursor::new(frame);
    assert!(matches!(
        read_message(&mut reader).await.unwrap_err(),
        ProtocolError::ConnectionClosed
    ));
}

#[tokio::test]
async fn response_error_shape_is_stable() {
    let resp = Response::error(
        "req-9",
        &crate::protocol::RpcError::new(mab_core::ErrorKind::Capacity, "town full"),
    );
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["id"], "req-9");
    assert!(json.get("result").is_none());
    assert_eq!(json["error"]["message"], "town full");
    assert_eq!(json["error"]["code"], mab_core::ErrorKind::Capacity.code());
}
