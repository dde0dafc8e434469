//! Shared harness for integration tests: node startup over a shared
//! in-memory meta store, plus a minimal wire client speaking the framed
//! protocol over a real TCP connection.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nombytes::NomBytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

use placekeeper::cluster::Config;
use placekeeper::encode::ToByte;
use placekeeper::error::Result;
use placekeeper::meta::MemStore;
use placekeeper::model::{Peer, Region, Store, StoreState};
use placekeeper::protocol::{encode_frame, read_frame};
use placekeeper::server::PlacementNode;
use placekeeper::server::request::{CmdType, RequestHeader, encode_empty_request, encode_request};
use placekeeper::server::response::{ParsedResponse, parse_response};
use placekeeper::types::{PeerId, RegionId, StoreId, Timestamp};

pub const TEST_CLUSTER_ID: u64 = 42;

/// Configuration tuned for fast failover in tests: one-second lease,
/// ephemeral port, isolated root path.
pub fn test_config() -> Config {
    Config {
        listen_addr: "127.0.0.1:0".to_string(),
        root_path: "/pd-test".to_string(),
        cluster_id: TEST_CLUSTER_ID,
        leader_lease_secs: 1,
        tso_save_interval_ms: 500,
        tso_update_step_ms: 50,
        ..Config::default()
    }
}

/// Start a node over `store` and wait for it to win leadership.
pub async fn start_leader(store: Arc<MemStore>) -> PlacementNode {
    let node = PlacementNode::start(test_config(), store)
        .await
        .expect("node starts");
    assert!(
        wait_for_leadership(&node, Duration::from_secs(5)).await,
        "node should win leadership"
    );
    node
}

/// Poll until the node reports leadership or the deadline passes.
pub async fn wait_for_leadership(node: &PlacementNode, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if node.is_leader() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    node.is_leader()
}

/// A store record for test clusters.
pub fn test_store(id: u64, address: &str) -> Store {
    Store {
        id: StoreId::new(id),
        address: address.to_string(),
        capacity: 1 << 30,
        state: StoreState::Up,
    }
}

/// The boundless initial region, replicated on one store.
pub fn initial_region(region_id: u64, peer_id: u64, store_id: u64) -> Region {
    Region {
        id: RegionId::new(region_id),
        start_key: vec![],
        end_key: vec![],
        peers: vec![Peer {
            peer_id: PeerId::new(peer_id),
            store_id: StoreId::new(store_id),
        }],
        leader_hint: StoreId::new(store_id),
    }
}

/// Minimal wire client: one request in flight at a time, correlation
/// ids and header echo checked on every exchange.
pub struct WireClient {
    stream: TcpStream,
    next_correlation: u64,
    next_uuid: u64,
    cluster_id: u64,
}

impl WireClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            stream,
            next_correlation: 1,
            next_uuid: 0x1000,
            cluster_id: TEST_CLUSTER_ID,
        }
    }

    /// Send a raw payload in a frame and read one response frame.
    pub async fn roundtrip_raw(&mut self, payload: &[u8]) -> Result<(u64, Bytes)> {
        let correlation = self.next_correlation;
        self.next_correlation += 1;
        self.send_frame(correlation, payload).await?;
        read_frame(&mut self.stream, 16 * 1024 * 1024).await
    }

    /// Write one frame without reading a response.
    pub async fn send_frame(&mut self, correlation: u64, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(correlation, payload);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write raw bytes onto the stream, bypassing framing.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one frame, for flows that split send and receive.
    pub async fn read_response_frame(&mut self) -> Result<(u64, Bytes)> {
        read_frame(&mut self.stream, 16 * 1024 * 1024).await
    }

    fn header(&mut self) -> RequestHeader {
        let uuid = self.next_uuid;
        self.next_uuid += 1;
        RequestHeader {
            uuid,
            cluster_id: self.cluster_id,
        }
    }

    /// Issue a typed request and decode the response envelope, checking
    /// the correlation id and header echo along the way.
    pub async fn request<B: ToByte>(&mut self, cmd: CmdType, body: &B) -> Result<ParsedResponse> {
        let header = self.header();
        let payload = encode_request(cmd, header, body)?;
        self.exchange(cmd, header, payload).await
    }

    /// Issue a body-less typed request.
    pub async fn request_empty(&mut self, cmd: CmdType) -> Result<ParsedResponse> {
        let header = self.header();
        let payload = encode_empty_request(cmd, header)?;
        self.exchange(cmd, header, payload).await
    }

    async fn exchange(
        &mut self,
        cmd: CmdType,
        header: RequestHeader,
        payload: Vec<u8>,
    ) -> Result<ParsedResponse> {
        let correlation = self.next_correlation;
        self.next_correlation += 1;
        self.send_frame(correlation, &payload).await?;

        let (echoed_correlation, response_payload) =
            read_frame(&mut self.stream, 16 * 1024 * 1024).await?;
        assert_eq!(
            echoed_correlation, correlation,
            "correlation id must echo verbatim"
        );

        let response = parse_response(response_payload)?;
        assert_eq!(response.cmd, cmd, "response command must match request");
        assert_eq!(response.header.uuid, header.uuid, "uuid must echo");
        assert_eq!(
            response.header.cluster_id, header.cluster_id,
            "cluster id must echo"
        );
        Ok(response)
    }

    /// Request a timestamp batch, panicking on a non-zero error code.
    pub async fn tso(&mut self, count: u32) -> Vec<Timestamp> {
        use placekeeper::server::request::TsoRequestData;
        use placekeeper::server::response::parse_tso_response;

        let response = self
            .request(CmdType::Tso, &TsoRequestData { count })
            .await
            .expect("tso exchange");
        assert_eq!(
            response.code,
            placekeeper::error::ErrorCode::None,
            "tso failed: {:?}",
            response.message
        );
        let (_, body) = parse_tso_response(NomBytes::new(response.body)).expect("tso body");
        body.timestamps
    }

    /// Allocate one ID, panicking on a non-zero error code.
    pub async fn alloc_id(&mut self) -> u64 {
        use placekeeper::server::response::parse_alloc_id_response;

        let response = self
            .request_empty(CmdType::AllocId)
            .await
            .expect("alloc exchange");
        assert_eq!(
            response.code,
            placekeeper::error::ErrorCode::None,
            "alloc failed: {:?}",
            response.message
        );
        let (_, body) = parse_alloc_id_response(NomBytes::new(response.body)).expect("alloc body");
        body.id
    }

    /// Query the bootstrap flag.
    pub async fn is_bootstrapped(&mut self) -> bool {
        use placekeeper::server::response::parse_is_bootstrapped_response;

        let response = self
            .request_empty(CmdType::IsBootstrapped)
            .await
            .expect("is_bootstrapped exchange");
        assert_eq!(response.code, placekeeper::error::ErrorCode::None);
        let (_, body) =
            parse_is_bootstrapped_response(NomBytes::new(response.body)).expect("body");
        body.bootstrapped
    }

    /// Bootstrap the cluster; returns the raw response for code checks.
    pub async fn bootstrap(&mut self, store: Store, region: Region) -> ParsedResponse {
        use placekeeper::server::request::BootstrapRequestData;

        self.request(CmdType::Bootstrap, &BootstrapRequestData { store, region })
            .await
            .expect("bootstrap exchange")
    }

    /// Locate the region containing `key`; panics on error codes.
    pub async fn get_region(&mut self, key: &[u8]) -> Region {
        use placekeeper::server::request::GetRegionRequestData;
        use placekeeper::server::response::parse_get_region_response;

        let response = self
            .request(
                CmdType::GetRegion,
                &GetRegionRequestData {
                    region_key: Bytes::copy_from_slice(key),
                },
            )
            .await
            .expect("get_region exchange");
        assert_eq!(
            response.code,
            placekeeper::error::ErrorCode::None,
            "get_region failed: {:?}",
            response.message
        );
        let (_, body) = parse_get_region_response(NomBytes::new(response.body)).expect("body");
        body.region
    }
}

/// Bootstrap a fresh cluster with one store and the boundless region.
pub async fn bootstrap_cluster(client: &mut WireClient) {
    let response = client
        .bootstrap(test_store(1, "store-1:20160"), initial_region(1, 1, 1))
        .await;
    assert_eq!(
        response.code,
        placekeeper::error::ErrorCode::None,
        "bootstrap failed: {:?}",
        response.message
    );
}
