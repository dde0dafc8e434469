//! Wire-protocol integration tests.
//!
//! Drive a real server over TCP and verify framing behavior at the byte
//! level: correlation-id echo, header echo, the typed-error-versus-
//! transport-error split, and hostile-frame handling.
//!
//! **Note:** these tests bind TCP listeners on 127.0.0.1 and will fail
//! in sandboxes that restrict sockets.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::BufMut;
use common::*;
use placekeeper::error::ErrorCode;
use placekeeper::meta::MemStore;
use placekeeper::server::request::{CmdType, TsoRequestData, encode_empty_request, encode_request};
use tokio::time::timeout;

#[tokio::test]
async fn correlation_and_header_echo() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    // The typed helpers assert echo on every exchange; run a few
    // commands to cover distinct correlation ids and uuids.
    let _ = client.is_bootstrapped().await;
    let _ = client.tso(1).await;
    let _ = client.alloc_id().await;

    node.shutdown().await;
}

#[tokio::test]
async fn responses_come_back_in_request_order() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    // Queue three frames before reading anything; the per-connection
    // loop must answer them in order.
    for correlation in [101u64, 102, 103] {
        let payload = encode_request(
            CmdType::Tso,
            placekeeper::server::request::RequestHeader {
                uuid: correlation,
                cluster_id: TEST_CLUSTER_ID,
            },
            &TsoRequestData { count: 1 },
        )
        .unwrap();
        client.send_frame(correlation, &payload).await.unwrap();
    }

    for expected in [101u64, 102, 103] {
        let (correlation, _) = client.read_response_frame().await.unwrap();
        assert_eq!(correlation, expected);
    }

    node.shutdown().await;
}

#[tokio::test]
async fn logical_error_keeps_connection_open() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    // GetRegion before bootstrap is a typed error in the body...
    use placekeeper::server::request::GetRegionRequestData;
    let response = client
        .request(
            CmdType::GetRegion,
            &GetRegionRequestData {
                region_key: bytes::Bytes::from_static(b"k"),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::NotBootstrapped);

    // ...and the same connection keeps working.
    assert!(!client.is_bootstrapped().await);

    node.shutdown().await;
}

#[tokio::test]
async fn unknown_command_is_a_typed_error() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    let response = client.request_empty(CmdType::Unknown(222)).await.unwrap();
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    // Connection survives.
    let _ = client.tso(1).await;

    node.shutdown().await;
}

#[tokio::test]
async fn bad_magic_drops_the_connection() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    let mut garbage = Vec::new();
    garbage.put_u16(0xDEAD); // wrong magic
    garbage.put_u16(1);
    garbage.put_u64(1);
    garbage.put_u32(0);
    client.send_bytes(&garbage).await.unwrap();

    let result = timeout(Duration::from_secs(2), client.read_response_frame()).await;
    assert!(
        matches!(result, Ok(Err(_))),
        "server must hang up on a bad magic, got {result:?}"
    );

    node.shutdown().await;
}

#[tokio::test]
async fn over_cap_frame_drops_the_connection() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    // A header declaring a payload far beyond the server cap; the body
    // never needs to be sent.
    let mut frame = Vec::new();
    frame.put_u16(0x504C);
    frame.put_u16(1);
    frame.put_u64(9);
    frame.put_u32(512 * 1024 * 1024);
    client.send_bytes(&frame).await.unwrap();

    let result = timeout(Duration::from_secs(2), client.read_response_frame()).await;
    assert!(matches!(result, Ok(Err(_))));

    node.shutdown().await;
}

#[tokio::test]
async fn malformed_request_body_drops_the_connection() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    // A valid frame whose payload is a truncated Tso request.
    let mut payload = encode_empty_request(
        CmdType::Tso,
        placekeeper::server::request::RequestHeader {
            uuid: 1,
            cluster_id: TEST_CLUSTER_ID,
        },
    )
    .unwrap();
    payload.push(0x01); // one byte where a u32 count belongs

    client.send_frame(55, &payload).await.unwrap();
    let result = timeout(Duration::from_secs(2), client.read_response_frame()).await;
    assert!(matches!(result, Ok(Err(_))));

    node.shutdown().await;
}

#[tokio::test]
async fn follower_answers_not_leader_then_hangs_up() {
    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;

    // A second replica on the same store stays follower.
    let follower = placekeeper::server::PlacementNode::start(test_config(), store)
        .await
        .unwrap();
    assert!(!follower.is_leader());

    let mut client = WireClient::connect(follower.addr()).await;
    let response = client.request_empty(CmdType::AllocId).await.unwrap();
    assert_eq!(response.code, ErrorCode::NotLeader);

    // After the response the follower closes the connection so the
    // client re-resolves.
    let result = timeout(Duration::from_secs(2), client.read_response_frame()).await;
    assert!(matches!(result, Ok(Err(_))));

    follower.shutdown().await;
    node.shutdown().await;
}
