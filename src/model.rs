//! Cluster metadata records.
//!
//! These shapes travel in two directions: serialized with serde into the
//! meta store, and hand-encoded onto the wire inside requests and
//! responses. The wire codecs live here next to the types so the two
//! stay in lockstep.

use bytes::{BufMut, Bytes};
use nom::IResult;
use nom::number::complete::{be_u8, be_u32, be_u64};
use nombytes::NomBytes;
use serde::{Deserialize, Serialize};

use crate::encode::{ToByte, encode_as_array};
use crate::error::Result;
use crate::parser::{bytes_to_string, parse_array, parse_bytes, parse_string};
use crate::types::{PeerId, RegionId, StoreId};

/// Lifecycle state of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreState {
    /// Serving traffic.
    #[default]
    Up = 0,
    /// Unreachable; regions are being moved away.
    Offline = 1,
    /// Fully drained and removed. Terminal.
    Tombstone = 2,
}

impl StoreState {
    /// Decode from the wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StoreState::Up),
            1 => Some(StoreState::Offline),
            2 => Some(StoreState::Tombstone),
            _ => None,
        }
    }
}

/// A data node hosting region replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub address: String,
    pub capacity: u64,
    pub state: StoreState,
}

impl ToByte for Store {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.id.encode(buffer)?;
        self.address.encode(buffer)?;
        self.capacity.encode(buffer)?;
        (self.state as u8).encode(buffer)
    }
}

/// Parse a store record from the wire.
pub fn parse_store(s: NomBytes) -> IResult<NomBytes, Store> {
    let (s, id) = be_u64(s)?;
    let (s, address_bytes) = parse_string(s)?;
    let address = bytes_to_string(&address_bytes)?;
    let (s, capacity) = be_u64(s)?;
    let (s, state_byte) = be_u8(s)?;
    let state = StoreState::from_u8(state_byte).ok_or_else(|| {
        nom::Err::Failure(nom::error::Error::new(
            s.clone(),
            nom::error::ErrorKind::Verify,
        ))
    })?;
    Ok((
        s,
        Store {
            id: StoreId::new(id),
            address,
            capacity,
            state,
        },
    ))
}

/// One replica of a region, living on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: PeerId,
    pub store_id: StoreId,
}

impl ToByte for Peer {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.peer_id.encode(buffer)?;
        self.store_id.encode(buffer)
    }
}

/// Parse a peer from the wire.
pub fn parse_peer(s: NomBytes) -> IResult<NomBytes, Peer> {
    let (s, peer_id) = be_u64(s)?;
    let (s, store_id) = be_u64(s)?;
    Ok((
        s,
        Peer {
            peer_id: PeerId::new(peer_id),
            store_id: StoreId::new(store_id),
        },
    ))
}

/// A contiguous key range and its replica set.
///
/// Ranges are lexicographic and end-exclusive. An empty `start_key` means
/// the range begins at -∞; an empty `end_key` means it runs to +∞. The
/// set of all regions partitions the key space with no gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(with = "serde_bytes_vec")]
    pub start_key: Vec<u8>,
    #[serde(with = "serde_bytes_vec")]
    pub end_key: Vec<u8>,
    pub peers: Vec<Peer>,
    /// Store the region's raft leader was last seen on; 0 when unknown.
    pub leader_hint: StoreId,
}

impl Region {
    /// Whether `key` falls inside this region's range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }

    /// Whether this region covers the entire key space.
    pub fn covers_everything(&self) -> bool {
        self.start_key.is_empty() && self.end_key.is_empty()
    }
}

impl ToByte for Region {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.id.encode(buffer)?;
        self.start_key.encode(buffer)?;
        self.end_key.encode(buffer)?;
        encode_as_array(buffer, &self.peers, |b, p| p.encode(b))?;
        self.leader_hint.encode(buffer)
    }
}

/// Parse a region record from the wire.
pub fn parse_region(s: NomBytes) -> IResult<NomBytes, Region> {
    let (s, id) = be_u64(s)?;
    let (s, start_key) = parse_bytes(s)?;
    let (s, end_key) = parse_bytes(s)?;
    let (s, peers) = parse_array(parse_peer)(s)?;
    let (s, leader_hint) = be_u64(s)?;
    Ok((
        s,
        Region {
            id: RegionId::new(id),
            start_key: start_key.to_vec(),
            end_key: end_key.to_vec(),
            peers,
            leader_hint: StoreId::new(leader_hint),
        },
    ))
}

/// Cluster-wide parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMeta {
    pub cluster_id: u64,
    /// Target replica count per region.
    pub max_replicas: u32,
}

impl ToByte for ClusterMeta {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.cluster_id.encode(buffer)?;
        self.max_replicas.encode(buffer)
    }
}

/// Parse cluster parameters from the wire.
pub fn parse_cluster_meta(s: NomBytes) -> IResult<NomBytes, ClusterMeta> {
    let (s, cluster_id) = be_u64(s)?;
    let (s, max_replicas) = be_u32(s)?;
    Ok((
        s,
        ClusterMeta {
            cluster_id,
            max_replicas,
        },
    ))
}

/// Identity the leader publishes under the leader key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    /// Wire address clients should connect to.
    pub addr: String,
    /// Process id, to tell apart restarts on the same address.
    pub pid: u32,
}

impl LeaderRecord {
    /// Serialize for storage under the leader key.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(serde_json::to_vec(self).expect("leader record serializes"))
    }
}

/// Key-range bytes shown as escaped ASCII for logs.
pub fn key_display(key: &[u8]) -> String {
    if key.is_empty() {
        return "∞".to_string();
    }
    key.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

mod serde_bytes_vec {
    //! Keys are raw bytes; json needs them as arrays of numbers, which
    //! serde's default Vec<u8> handling already provides. This module
    //! exists to pin the representation should the format ever change.
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        bytes.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(de)
    }
}
