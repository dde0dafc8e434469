//! Region intake integration tests.
//!
//! Split and change-peer arbitration end to end: validation failures
//! leave no trace, accepted requests persist pending-decision records
//! under the region's key, and a region admits at most one pending
//! change-peer.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::*;
use nombytes::NomBytes;
use placekeeper::error::ErrorCode;
use placekeeper::meta::{MemStore, MetaStore};
use placekeeper::server::request::{
    AskChangePeerRequestData, AskSplitRequestData, CmdType, PutStoreRequestData,
};
use placekeeper::server::response::parse_ask_split_response;
use placekeeper::types::StoreId;

const REGION_KEY: &str = "/pd-test/cluster/regions/00000000000000000001";

async fn ask_split(
    client: &mut WireClient,
    split_key: &[u8],
    leader_store_id: u64,
) -> placekeeper::server::response::ParsedResponse {
    let region = client.get_region(b"").await;
    client
        .request(
            CmdType::AskSplit,
            &AskSplitRequestData {
                region,
                leader_store_id: StoreId::new(leader_store_id),
                split_key: Bytes::copy_from_slice(split_key),
            },
        )
        .await
        .expect("ask_split exchange")
}

#[tokio::test]
async fn valid_split_reserves_ids_and_persists_decision() {
    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    let response = ask_split(&mut client, b"m", 1).await;
    assert_eq!(response.code, ErrorCode::None, "{:?}", response.message);

    let (_, body) = parse_ask_split_response(NomBytes::new(response.body)).unwrap();
    assert!(body.new_region_id.is_valid());
    assert_eq!(body.new_peer_ids.len(), 1, "one peer id per replica");
    assert_ne!(body.new_region_id.value(), body.new_peer_ids[0].value());

    // The decision is durable under the region's key.
    let pending = store
        .get(&format!("{REGION_KEY}/split"))
        .await
        .unwrap()
        .expect("pending split record");
    let record: placekeeper::cluster::PendingSplit =
        serde_json::from_slice(&pending.value).unwrap();
    assert_eq!(record.region_id.value(), 1);
    assert_eq!(record.split_key, b"m".to_vec());
    assert_eq!(record.new_region_id, body.new_region_id);

    node.shutdown().await;
}

#[tokio::test]
async fn split_outside_range_is_rejected_without_trace() {
    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    // The bootstrap region is boundless, so the only key outside its
    // splittable interior is the start key itself, which would leave an
    // empty left half.
    let response = ask_split(&mut client, b"", 1).await;
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    assert!(
        store.get(&format!("{REGION_KEY}/split")).await.unwrap().is_none(),
        "a rejected split must leave no pending record"
    );

    node.shutdown().await;
}

#[tokio::test]
async fn split_from_non_member_store_is_rejected() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    // Store 7 holds no replica of region 1 and cannot be its leader.
    let response = ask_split(&mut client, b"m", 7).await;
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    // Leader store id zero means the field was never filled in.
    let response = ask_split(&mut client, b"m", 0).await;
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    node.shutdown().await;
}

#[tokio::test]
async fn split_of_unknown_region_is_rejected() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    let mut region = client.get_region(b"").await;
    region.id = placekeeper::types::RegionId::new(99);
    let response = client
        .request(
            CmdType::AskSplit,
            &AskSplitRequestData {
                region,
                leader_store_id: StoreId::new(1),
                split_key: Bytes::from_static(b"m"),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    node.shutdown().await;
}

#[tokio::test]
async fn change_peer_adds_on_underreplicated_region() {
    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    // With a single store there is nowhere to put a second replica.
    let region = client.get_region(b"").await;
    let response = client
        .request(
            CmdType::AskChangePeer,
            &AskChangePeerRequestData {
                region: region.clone(),
                leader_store_id: StoreId::new(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    // Register a second store; now the add-peer decision lands.
    let response = client
        .request(
            CmdType::PutStore,
            &PutStoreRequestData {
                store: test_store(2, "store-2:20160"),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::None);

    let response = client
        .request(
            CmdType::AskChangePeer,
            &AskChangePeerRequestData {
                region,
                leader_store_id: StoreId::new(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::None, "{:?}", response.message);

    let pending = store
        .get(&format!("{REGION_KEY}/change_peer"))
        .await
        .unwrap()
        .expect("pending change-peer record");
    let record: placekeeper::cluster::PendingChangePeer =
        serde_json::from_slice(&pending.value).unwrap();
    assert_eq!(record.kind, placekeeper::cluster::ChangePeerKind::AddPeer);
    assert_eq!(record.peer.store_id.value(), 2);
    assert!(record.peer.peer_id.value() > 0);

    node.shutdown().await;
}

#[tokio::test]
async fn second_change_peer_conflicts() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    let response = client
        .request(
            CmdType::PutStore,
            &PutStoreRequestData {
                store: test_store(2, "store-2:20160"),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::None);

    let region = client.get_region(b"").await;
    let ask = AskChangePeerRequestData {
        region,
        leader_store_id: StoreId::new(1),
    };

    let first = client
        .request(CmdType::AskChangePeer, &ask)
        .await
        .unwrap();
    assert_eq!(first.code, ErrorCode::None);

    let second = client
        .request(CmdType::AskChangePeer, &ask)
        .await
        .unwrap();
    assert_eq!(second.code, ErrorCode::ConflictingOperator);

    node.shutdown().await;
}

#[tokio::test]
async fn change_peer_removes_on_overreplicated_region() {
    use placekeeper::model::ClusterMeta;
    use placekeeper::server::request::PutClusterConfigRequestData;

    let store = Arc::new(MemStore::new());
    let node = start_leader(store.clone()).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    // Lower the replication target below the region's replica count, so
    // the next change-peer request records a removal.
    let response = client
        .request(
            CmdType::PutClusterConfig,
            &PutClusterConfigRequestData {
                cluster: ClusterMeta {
                    cluster_id: TEST_CLUSTER_ID,
                    max_replicas: 1,
                },
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::None, "{:?}", response.message);

    let region = client.get_region(b"").await;
    let response = client
        .request(
            CmdType::AskChangePeer,
            &AskChangePeerRequestData {
                region,
                leader_store_id: StoreId::new(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::None, "{:?}", response.message);

    let pending = store
        .get(&format!("{REGION_KEY}/change_peer"))
        .await
        .unwrap()
        .expect("pending change-peer record");
    let record: placekeeper::cluster::PendingChangePeer =
        serde_json::from_slice(&pending.value).unwrap();
    assert_eq!(record.kind, placekeeper::cluster::ChangePeerKind::RemovePeer);
    assert_eq!(record.peer.peer_id.value(), 1);

    node.shutdown().await;
}

#[tokio::test]
async fn put_store_rejects_bad_records() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    // Empty address.
    let mut store = test_store(3, "");
    let response = client
        .request(CmdType::PutStore, &PutStoreRequestData { store })
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    // Tombstoned stores are terminal and cannot be re-put.
    store = test_store(3, "store-3:20160");
    store.state = placekeeper::model::StoreState::Tombstone;
    let response = client
        .request(CmdType::PutStore, &PutStoreRequestData { store })
        .await
        .unwrap();
    assert_eq!(response.code, ErrorCode::InvalidRequest);

    node.shutdown().await;
}

#[tokio::test]
async fn get_region_covers_every_key_after_bootstrap() {
    let node = start_leader(Arc::new(MemStore::new())).await;
    let mut client = WireClient::connect(node.addr()).await;
    bootstrap_cluster(&mut client).await;

    for key in [&b""[..], b"\x00", b"a", b"zzzz", &[0xFF; 16]] {
        let region = client.get_region(key).await;
        assert_eq!(region.id.value(), 1, "key {key:?} must resolve");
    }

    node.shutdown().await;
}
