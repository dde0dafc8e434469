//! Cluster bootstrap integration tests.
//!
//! Cover the one-shot bootstrap transaction end to end: the S1 round
//! trip, its validation set, and the concurrent-bootstrap race where
//! exactly one caller wins.

mod common;

use std::sync::Arc;

use common::*;
use placekeeper::error::ErrorCode;
use placekeeper::meta::{MemStore, MetaStore};
use placekeeper::server::request::CmdType;

#[tokio::test]
async fn bootstrap_round_trip() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    assert!(!client.is_bootstrapped().await);

    bootstrap_cluster(&mut client).await;

    assert!(client.is_bootstrapped().await);

    let region = client.get_region(b"anything").await;
    assert_eq!(region.id.value(), 1);
    assert!(region.start_key.is_empty());
    assert!(region.end_key.is_empty());

    node.shutdown().await;
}

#[tokio::test]
async fn second_bootstrap_reports_already_bootstrapped() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    bootstrap_cluster(&mut client).await;

    let response = client
        .bootstrap(test_store(9, "store-9:20160"), initial_region(9, 9, 9))
        .await;
    assert_eq!(response.code, ErrorCode::AlreadyBootstrapped);

    // The original bootstrap's state is untouched.
    let region = client.get_region(b"x").await;
    assert_eq!(region.id.value(), 1);

    node.shutdown().await;
}

#[tokio::test]
async fn concurrent_bootstrap_is_atomic() {
    let node = start_leader(Arc::new(MemStore::new())).await;

    let addr = node.addr();
    let race = |store_id: u64| async move {
        let mut client = WireClient::connect(addr).await;
        client
            .bootstrap(
                test_store(store_id, "store:20160"),
                initial_region(store_id, store_id, store_id),
            )
            .await
            .code
    };

    let (a, b) = tokio::join!(race(1), race(2));

    let outcomes = [a, b];
    assert_eq!(
        outcomes
            .iter()
            .filter(|code| **code == ErrorCode::None)
            .count(),
        1,
        "exactly one bootstrap must win, got {outcomes:?}"
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|code| **code == ErrorCode::AlreadyBootstrapped)
            .count(),
        1,
        "the loser must see AlreadyBootstrapped, got {outcomes:?}"
    );

    // Whoever won, the initial region covers the whole key space.
    let mut client = WireClient::connect(addr).await;
    let region = client.get_region(b"").await;
    assert!(region.start_key.is_empty());
    assert!(region.end_key.is_empty());

    node.shutdown().await;
}

#[tokio::test]
async fn bootstrap_validation_rejects_partial_region() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    let mut region = initial_region(1, 1, 1);
    region.end_key = b"m".to_vec();
    let response = client.bootstrap(test_store(1, "s:1"), region).await;
    assert_eq!(response.code, ErrorCode::InvalidRequest);
    assert!(!client.is_bootstrapped().await);

    node.shutdown().await;
}

#[tokio::test]
async fn bootstrap_validation_rejects_foreign_peers() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    // Peer on store 2, bootstrap store is 1.
    let region = initial_region(1, 1, 2);
    let response = client.bootstrap(test_store(1, "s:1"), region).await;
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    node.shutdown().await;
}

#[tokio::test]
async fn cluster_operations_before_bootstrap_are_rejected() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;

    use placekeeper::server::request::GetStoreRequestData;
    let response = client
        .request(
            CmdType::GetStore,
            &GetStoreRequestData {
                store_id: placekeeper::types::StoreId::new(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::NotBootstrapped);

    let response = client.request_empty(CmdType::GetClusterConfig).await.unwrap();
    assert_eq!(response.code, ErrorCode::NotBootstrapped);

    node.shutdown().await;
}

#[tokio::test]
async fn bootstrap_persists_into_the_meta_store() {
    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;
    let mut client = WireClient::connect(node.addr()).await;

    bootstrap_cluster(&mut client).await;

    assert!(store.get("/pd-test/bootstrap").await.unwrap().is_some());
    assert!(store.get("/pd-test/cluster/meta").await.unwrap().is_some());
    assert!(
        store
            .get("/pd-test/cluster/stores/00000000000000000001")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .get("/pd-test/cluster/regions/00000000000000000001")
            .await
            .unwrap()
            .is_some()
    );

    node.shutdown().await;
}

#[tokio::test]
async fn state_survives_failover() {
    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;
    node.shutdown().await;

    // A fresh leader rebuilds state from the meta store.
    let next = start_leader(store).await;
    let mut client = WireClient::connect(next.addr()).await;
    assert!(client.is_bootstrapped().await);
    assert_eq!(client.get_region(b"k").await.id.value(), 1);

    next.shutdown().await;
}
