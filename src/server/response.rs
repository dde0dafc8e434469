//! Response encoding for outgoing wire messages.
//!
//! A response payload mirrors the request: command type, echoed header,
//! then an error code. Code zero is followed by the command's body; any
//! other code is followed by an error message string instead.
//!
//! ```text
//! cmd:        u16
//! uuid:       u64     echoed from the request
//! cluster id: u64     echoed from the request
//! error code: i16
//! body | message
//! ```
//!
//! The parsing half lives here too, for clients and tests.

use bytes::{BufMut, Bytes};
use nom::IResult;
use nom::number::complete::{be_i16, be_u16, be_u32, be_u64};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::encode::{ToByte, encode_as_array};
use crate::error::{Error, ErrorCode, Result};
use crate::model::{ClusterMeta, Region, Store, parse_cluster_meta, parse_region, parse_store};
use crate::parser::{bytes_to_string, parse_array, parse_bool, parse_string, parse_u64};
use crate::types::{PeerId, RegionId, Timestamp};

use super::request::{CmdType, RequestHeader};

/// Header echoed into every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseHeader {
    pub uuid: u64,
    pub cluster_id: u64,
}

impl From<RequestHeader> for ResponseHeader {
    fn from(header: RequestHeader) -> Self {
        ResponseHeader {
            uuid: header.uuid,
            cluster_id: header.cluster_id,
        }
    }
}

impl ToByte for ResponseHeader {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.uuid.encode(buffer)?;
        self.cluster_id.encode(buffer)
    }
}

/// Body of a `Tso` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsoResponseData {
    pub timestamps: Vec<Timestamp>,
}

impl ToByte for TsoResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_as_array(buffer, &self.timestamps, |b, ts| ts.encode(b))
    }
}

fn parse_timestamp(s: NomBytes) -> IResult<NomBytes, Timestamp> {
    let (s, physical) = nom::number::complete::be_i64(s)?;
    let (s, logical) = be_u32(s)?;
    Ok((s, Timestamp { physical, logical }))
}

/// Parse a `Tso` response body.
pub fn parse_tso_response(s: NomBytes) -> IResult<NomBytes, TsoResponseData> {
    let (s, timestamps) = parse_array(parse_timestamp)(s)?;
    Ok((s, TsoResponseData { timestamps }))
}

/// Body of an `AllocId` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocIdResponseData {
    pub id: u64,
}

impl ToByte for AllocIdResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.id.encode(buffer)
    }
}

/// Parse an `AllocId` response body.
pub fn parse_alloc_id_response(s: NomBytes) -> IResult<NomBytes, AllocIdResponseData> {
    let (s, id) = be_u64(s)?;
    Ok((s, AllocIdResponseData { id }))
}

/// Body of an `IsBootstrapped` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsBootstrappedResponseData {
    pub bootstrapped: bool,
}

impl ToByte for IsBootstrappedResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.bootstrapped.encode(buffer)
    }
}

/// Parse an `IsBootstrapped` response body.
pub fn parse_is_bootstrapped_response(s: NomBytes) -> IResult<NomBytes, IsBootstrappedResponseData> {
    let (s, bootstrapped) = parse_bool(s)?;
    Ok((s, IsBootstrappedResponseData { bootstrapped }))
}

/// Body of a `Bootstrap` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapResponseData;

impl ToByte for BootstrapResponseData {
    fn encode<W: BufMut>(&self, _buffer: &mut W) -> Result<()> {
        Ok(())
    }
}

/// Body of a `GetStore` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetStoreResponseData {
    pub store: Store,
}

impl ToByte for GetStoreResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.store.encode(buffer)
    }
}

/// Parse a `GetStore` response body.
pub fn parse_get_store_response(s: NomBytes) -> IResult<NomBytes, GetStoreResponseData> {
    let (s, store) = parse_store(s)?;
    Ok((s, GetStoreResponseData { store }))
}

/// Body of a `PutStore` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutStoreResponseData;

impl ToByte for PutStoreResponseData {
    fn encode<W: BufMut>(&self, _buffer: &mut W) -> Result<()> {
        Ok(())
    }
}

/// Body of a `GetRegion` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRegionResponseData {
    pub region: Region,
}

impl ToByte for GetRegionResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.region.encode(buffer)
    }
}

/// Parse a `GetRegion` response body.
pub fn parse_get_region_response(s: NomBytes) -> IResult<NomBytes, GetRegionResponseData> {
    let (s, region) = parse_region(s)?;
    Ok((s, GetRegionResponseData { region }))
}

/// Body of a `GetClusterConfig` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetClusterConfigResponseData {
    pub cluster: ClusterMeta,
}

impl ToByte for GetClusterConfigResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.cluster.encode(buffer)
    }
}

/// Parse a `GetClusterConfig` response body.
pub fn parse_get_cluster_config_response(
    s: NomBytes,
) -> IResult<NomBytes, GetClusterConfigResponseData> {
    let (s, cluster) = parse_cluster_meta(s)?;
    Ok((s, GetClusterConfigResponseData { cluster }))
}

/// Body of a `PutClusterConfig` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutClusterConfigResponseData;

impl ToByte for PutClusterConfigResponseData {
    fn encode<W: BufMut>(&self, _buffer: &mut W) -> Result<()> {
        Ok(())
    }
}

/// Body of an `AskSplit` response: the IDs reserved for the split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskSplitResponseData {
    pub new_region_id: RegionId,
    pub new_peer_ids: Vec<PeerId>,
}

impl ToByte for AskSplitResponseData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.new_region_id.encode(buffer)?;
        encode_as_array(buffer, &self.new_peer_ids, |b, id| id.encode(b))
    }
}

/// Parse an `AskSplit` response body.
pub fn parse_ask_split_response(s: NomBytes) -> IResult<NomBytes, AskSplitResponseData> {
    let (s, new_region_id) = be_u64(s)?;
    let (s, ids) = parse_array(parse_u64)(s)?;
    Ok((
        s,
        AskSplitResponseData {
            new_region_id: RegionId::new(new_region_id),
            new_peer_ids: ids.into_iter().map(PeerId::new).collect(),
        },
    ))
}

/// Body of an `AskChangePeer` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AskChangePeerResponseData;

impl ToByte for AskChangePeerResponseData {
    fn encode<W: BufMut>(&self, _buffer: &mut W) -> Result<()> {
        Ok(())
    }
}

/// A complete response payload ready for framing.
#[derive(Debug, Clone)]
pub struct Response {
    pub cmd: CmdType,
    pub header: ResponseHeader,
    pub code: ErrorCode,
    pub message: Option<String>,
    body: Vec<u8>,
}

impl Response {
    /// A success response wrapping a typed body.
    pub fn ok<B: ToByte>(cmd: CmdType, header: ResponseHeader, body: &B) -> Result<Self> {
        let mut buf = Vec::new();
        body.encode(&mut buf)?;
        Ok(Self {
            cmd,
            header,
            code: ErrorCode::None,
            message: None,
            body: buf,
        })
    }

    /// A typed error response; the connection stays usable.
    pub fn error(
        cmd: CmdType,
        header: ResponseHeader,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cmd,
            header,
            code,
            message: Some(message.into()),
            body: Vec::new(),
        }
    }

    /// Encode the payload: command, header, code, then body or message.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        u16::from(self.cmd).encode(&mut buf)?;
        self.header.encode(&mut buf)?;
        (self.code as i16).encode(&mut buf)?;
        if self.code == ErrorCode::None {
            buf.extend_from_slice(&self.body);
        } else {
            self.message.as_deref().unwrap_or("").encode(&mut buf)?;
        }
        Ok(buf)
    }
}

/// A decoded response payload, body left raw for the typed parsers.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub cmd: CmdType,
    pub header: ResponseHeader,
    pub code: ErrorCode,
    /// Error message when `code` is non-zero.
    pub message: Option<String>,
    /// Raw body bytes when `code` is zero.
    pub body: Bytes,
}

/// Decode a response payload's envelope.
pub fn parse_response(data: Bytes) -> Result<ParsedResponse> {
    let input = NomBytes::new(data.clone());
    let parsed: IResult<NomBytes, ParsedResponse> = (|| {
        let (s, cmd) = be_u16(input.clone())?;
        let (s, uuid) = be_u64(s)?;
        let (s, cluster_id) = be_u64(s)?;
        let (s, code_raw) = be_i16(s)?;
        let code = ErrorCode::from_i16(code_raw).unwrap_or(ErrorCode::Unknown);
        if code == ErrorCode::None {
            let body = s.clone().into_bytes();
            Ok((
                s,
                ParsedResponse {
                    cmd: CmdType::from(cmd),
                    header: ResponseHeader { uuid, cluster_id },
                    code,
                    message: None,
                    body,
                },
            ))
        } else {
            let (s, message) = parse_string(s)?;
            let message = bytes_to_string(&message)?;
            Ok((
                s,
                ParsedResponse {
                    cmd: CmdType::from(cmd),
                    header: ResponseHeader { uuid, cluster_id },
                    code,
                    message: Some(message),
                    body: Bytes::new(),
                },
            ))
        }
    })();

    match parsed {
        Ok((_, response)) => Ok(response),
        Err(_) => Err(Error::ParsingError(data)),
    }
}
