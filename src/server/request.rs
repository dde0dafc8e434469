//! Request parsing for incoming wire messages.
//!
//! A request payload is a command type, a header echoed into the
//! response, and a command-specific body:
//!
//! ```text
//! cmd:        u16
//! uuid:       u64      client-chosen, echoed
//! cluster id: u64      echoed
//! body:       per command
//! ```
//!
//! The encoding half of each body lives here too, next to its parser,
//! for clients and tests that speak the protocol.

use bytes::{BufMut, Bytes};
use nom::IResult;
use nom::number::complete::{be_u32, be_u64};
use nombytes::NomBytes;

use crate::encode::ToByte;
use crate::error::{Error, Result};
use crate::model::{Region, Store, parse_region, parse_store};
use crate::parser::parse_bytes;
use crate::types::StoreId;

/// Command types of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdType {
    Tso,
    AllocId,
    Bootstrap,
    IsBootstrapped,
    GetStore,
    PutStore,
    GetRegion,
    GetClusterConfig,
    PutClusterConfig,
    AskSplit,
    AskChangePeer,
    Unknown(u16),
}

impl From<u16> for CmdType {
    fn from(value: u16) -> Self {
        match value {
            1 => CmdType::Tso,
            2 => CmdType::AllocId,
            3 => CmdType::Bootstrap,
            4 => CmdType::IsBootstrapped,
            5 => CmdType::GetStore,
            6 => CmdType::PutStore,
            7 => CmdType::GetRegion,
            8 => CmdType::GetClusterConfig,
            9 => CmdType::PutClusterConfig,
            10 => CmdType::AskSplit,
            11 => CmdType::AskChangePeer,
            n => CmdType::Unknown(n),
        }
    }
}

impl From<CmdType> for u16 {
    fn from(cmd: CmdType) -> Self {
        match cmd {
            CmdType::Tso => 1,
            CmdType::AllocId => 2,
            CmdType::Bootstrap => 3,
            CmdType::IsBootstrapped => 4,
            CmdType::GetStore => 5,
            CmdType::PutStore => 6,
            CmdType::GetRegion => 7,
            CmdType::GetClusterConfig => 8,
            CmdType::PutClusterConfig => 9,
            CmdType::AskSplit => 10,
            CmdType::AskChangePeer => 11,
            CmdType::Unknown(n) => n,
        }
    }
}

impl CmdType {
    /// Static command name, used as a metrics label.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            CmdType::Tso => "Tso",
            CmdType::AllocId => "AllocId",
            CmdType::Bootstrap => "Bootstrap",
            CmdType::IsBootstrapped => "IsBootstrapped",
            CmdType::GetStore => "GetStore",
            CmdType::PutStore => "PutStore",
            CmdType::GetRegion => "GetRegion",
            CmdType::GetClusterConfig => "GetClusterConfig",
            CmdType::PutClusterConfig => "PutClusterConfig",
            CmdType::AskSplit => "AskSplit",
            CmdType::AskChangePeer => "AskChangePeer",
            CmdType::Unknown(_) => "Unknown",
        }
    }
}

/// Header every request carries; echoed verbatim in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestHeader {
    pub uuid: u64,
    pub cluster_id: u64,
}

impl ToByte for RequestHeader {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.uuid.encode(buffer)?;
        self.cluster_id.encode(buffer)
    }
}

fn parse_header(s: NomBytes) -> IResult<NomBytes, RequestHeader> {
    let (s, uuid) = be_u64(s)?;
    let (s, cluster_id) = be_u64(s)?;
    Ok((s, RequestHeader { uuid, cluster_id }))
}

/// Body of a `Tso` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsoRequestData {
    /// How many timestamps to issue.
    pub count: u32,
}

impl ToByte for TsoRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.count.encode(buffer)
    }
}

fn parse_tso(s: NomBytes) -> IResult<NomBytes, TsoRequestData> {
    let (s, count) = be_u32(s)?;
    Ok((s, TsoRequestData { count }))
}

/// Body of a `Bootstrap` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequestData {
    pub store: Store,
    pub region: Region,
}

impl ToByte for BootstrapRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.store.encode(buffer)?;
        self.region.encode(buffer)
    }
}

fn parse_bootstrap(s: NomBytes) -> IResult<NomBytes, BootstrapRequestData> {
    let (s, store) = parse_store(s)?;
    let (s, region) = parse_region(s)?;
    Ok((s, BootstrapRequestData { store, region }))
}

/// Body of a `GetStore` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetStoreRequestData {
    pub store_id: StoreId,
}

impl ToByte for GetStoreRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.store_id.encode(buffer)
    }
}

/// Body of a `PutStore` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutStoreRequestData {
    pub store: Store,
}

impl ToByte for PutStoreRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.store.encode(buffer)
    }
}

/// Body of a `GetRegion` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRegionRequestData {
    pub region_key: Bytes,
}

impl ToByte for GetRegionRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.region_key.as_ref().encode(buffer)
    }
}

/// Body of a `PutClusterConfig` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutClusterConfigRequestData {
    pub cluster: crate::model::ClusterMeta,
}

impl ToByte for PutClusterConfigRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.cluster.encode(buffer)
    }
}

/// Body of an `AskSplit` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskSplitRequestData {
    pub region: Region,
    pub leader_store_id: StoreId,
    pub split_key: Bytes,
}

impl ToByte for AskSplitRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.region.encode(buffer)?;
        self.leader_store_id.encode(buffer)?;
        self.split_key.as_ref().encode(buffer)
    }
}

fn parse_ask_split(s: NomBytes) -> IResult<NomBytes, AskSplitRequestData> {
    let (s, region) = parse_region(s)?;
    let (s, leader_store_id) = be_u64(s)?;
    let (s, split_key) = parse_bytes(s)?;
    Ok((
        s,
        AskSplitRequestData {
            region,
            leader_store_id: StoreId::new(leader_store_id),
            split_key,
        },
    ))
}

/// Body of an `AskChangePeer` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskChangePeerRequestData {
    pub region: Region,
    pub leader_store_id: StoreId,
}

impl ToByte for AskChangePeerRequestData {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.region.encode(buffer)?;
        self.leader_store_id.encode(buffer)
    }
}

fn parse_ask_change_peer(s: NomBytes) -> IResult<NomBytes, AskChangePeerRequestData> {
    let (s, region) = parse_region(s)?;
    let (s, leader_store_id) = be_u64(s)?;
    Ok((
        s,
        AskChangePeerRequestData {
            region,
            leader_store_id: StoreId::new(leader_store_id),
        },
    ))
}

/// A parsed request: header plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Tso(RequestHeader, TsoRequestData),
    AllocId(RequestHeader),
    Bootstrap(RequestHeader, BootstrapRequestData),
    IsBootstrapped(RequestHeader),
    GetStore(RequestHeader, GetStoreRequestData),
    PutStore(RequestHeader, PutStoreRequestData),
    GetRegion(RequestHeader, GetRegionRequestData),
    GetClusterConfig(RequestHeader),
    PutClusterConfig(RequestHeader, PutClusterConfigRequestData),
    AskSplit(RequestHeader, AskSplitRequestData),
    AskChangePeer(RequestHeader, AskChangePeerRequestData),
    Unknown(RequestHeader, u16),
}

impl Request {
    /// The echoed header.
    pub fn header(&self) -> &RequestHeader {
        match self {
            Request::Tso(h, _)
            | Request::AllocId(h)
            | Request::Bootstrap(h, _)
            | Request::IsBootstrapped(h)
            | Request::GetStore(h, _)
            | Request::PutStore(h, _)
            | Request::GetRegion(h, _)
            | Request::GetClusterConfig(h)
            | Request::PutClusterConfig(h, _)
            | Request::AskSplit(h, _)
            | Request::AskChangePeer(h, _)
            | Request::Unknown(h, _) => h,
        }
    }

    /// The command type.
    pub fn cmd(&self) -> CmdType {
        match self {
            Request::Tso(..) => CmdType::Tso,
            Request::AllocId(..) => CmdType::AllocId,
            Request::Bootstrap(..) => CmdType::Bootstrap,
            Request::IsBootstrapped(..) => CmdType::IsBootstrapped,
            Request::GetStore(..) => CmdType::GetStore,
            Request::PutStore(..) => CmdType::PutStore,
            Request::GetRegion(..) => CmdType::GetRegion,
            Request::GetClusterConfig(..) => CmdType::GetClusterConfig,
            Request::PutClusterConfig(..) => CmdType::PutClusterConfig,
            Request::AskSplit(..) => CmdType::AskSplit,
            Request::AskChangePeer(..) => CmdType::AskChangePeer,
            Request::Unknown(_, n) => CmdType::Unknown(*n),
        }
    }

    /// Parse a request payload.
    pub fn parse(data: Bytes) -> Result<Request> {
        let input = NomBytes::new(data.clone());
        let parsed: IResult<NomBytes, Request> = (|| {
            let (s, cmd) = nom::number::complete::be_u16(input.clone())?;
            let (s, header) = parse_header(s)?;
            match CmdType::from(cmd) {
                CmdType::Tso => {
                    let (s, body) = parse_tso(s)?;
                    Ok((s, Request::Tso(header, body)))
                }
                CmdType::AllocId => Ok((s, Request::AllocId(header))),
                CmdType::Bootstrap => {
                    let (s, body) = parse_bootstrap(s)?;
                    Ok((s, Request::Bootstrap(header, body)))
                }
                CmdType::IsBootstrapped => Ok((s, Request::IsBootstrapped(header))),
                CmdType::GetStore => {
                    let (s, store_id) = be_u64(s)?;
                    Ok((
                        s,
                        Request::GetStore(
                            header,
                            GetStoreRequestData {
                                store_id: StoreId::new(store_id),
                            },
                        ),
                    ))
                }
                CmdType::PutStore => {
                    let (s, store) = parse_store(s)?;
                    Ok((s, Request::PutStore(header, PutStoreRequestData { store })))
                }
                CmdType::GetRegion => {
                    let (s, region_key) = parse_bytes(s)?;
                    Ok((
                        s,
                        Request::GetRegion(header, GetRegionRequestData { region_key }),
                    ))
                }
                CmdType::GetClusterConfig => Ok((s, Request::GetClusterConfig(header))),
                CmdType::PutClusterConfig => {
                    let (s, cluster) = crate::model::parse_cluster_meta(s)?;
                    Ok((
                        s,
                        Request::PutClusterConfig(header, PutClusterConfigRequestData { cluster }),
                    ))
                }
                CmdType::AskSplit => {
                    let (s, body) = parse_ask_split(s)?;
                    Ok((s, Request::AskSplit(header, body)))
                }
                CmdType::AskChangePeer => {
                    let (s, body) = parse_ask_change_peer(s)?;
                    Ok((s, Request::AskChangePeer(header, body)))
                }
                CmdType::Unknown(n) => Ok((s, Request::Unknown(header, n))),
            }
        })();

        match parsed {
            Ok((_, request)) => Ok(request),
            Err(_) => Err(Error::ParsingError(data)),
        }
    }
}

/// Encode a full request payload: command, header, body.
pub fn encode_request<B: ToByte>(cmd: CmdType, header: RequestHeader, body: &B) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    u16::from(cmd).encode(&mut buf)?;
    header.encode(&mut buf)?;
    body.encode(&mut buf)?;
    Ok(buf)
}

/// Encode a body-less request payload: command and header only.
pub fn encode_empty_request(cmd: CmdType, header: RequestHeader) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    u16::from(cmd).encode(&mut buf)?;
    header.encode(&mut buf)?;
    Ok(buf)
}
