//! Framed wire codec.
//!
//! Every message on the wire, request or response, is one frame:
//!
//! ```text
//! magic:       u16   0x504C, connection dropped on mismatch
//! version:     u16   protocol version, currently 1
//! id:          u64   correlation id, echoed verbatim in the response
//! length:      u32   payload byte count, bounded by the server's cap
//! payload:     length bytes
//! ```
//!
//! All integers are big-endian. The payload is a serialized request or
//! response message (see [`crate::server::request`] and
//! [`crate::server::response`]).
//!
//! Over-cap or malformed frames are transport errors: the connection that
//! produced them is closed. Logical errors never surface here; they travel
//! inside response payloads.

use bytes::{Buf, BufMut, Bytes};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{FRAME_HEADER_SIZE, FRAME_MAGIC, FRAME_VERSION};
use crate::error::{Error, Result};

/// Decoded fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Correlation id, echoed from request to response.
    pub correlation_id: u64,
    /// Payload byte count.
    pub payload_len: u32,
}

/// Decode and validate a frame header from exactly
/// [`FRAME_HEADER_SIZE`] bytes.
pub fn decode_frame_header(buf: &[u8; FRAME_HEADER_SIZE], max_payload: usize) -> Result<FrameHeader> {
    let mut cursor = &buf[..];
    let magic = cursor.get_u16();
    if magic != FRAME_MAGIC {
        return Err(Error::BadMagic(magic));
    }
    let version = cursor.get_u16();
    if version != FRAME_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let correlation_id = cursor.get_u64();
    let payload_len = cursor.get_u32();
    if payload_len as usize > max_payload {
        return Err(Error::FrameTooLarge {
            size: payload_len as usize,
            max: max_payload,
        });
    }
    Ok(FrameHeader {
        correlation_id,
        payload_len,
    })
}

/// Encode a complete frame into a fresh buffer.
pub fn encode_frame(correlation_id: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u16(FRAME_MAGIC);
    buf.put_u16(FRAME_VERSION);
    buf.put_u64(correlation_id);
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf
}

/// Read one frame from `reader`.
///
/// Returns `Error::MissingData` on a clean EOF before the header (the
/// peer hung up between requests) and an IO/protocol error otherwise.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<(u64, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut header_buf).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(Error::MissingData("connection closed".to_owned()));
        }
        return Err(Error::IoError(e.kind()));
    }

    let header = decode_frame_header(&header_buf, max_payload)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    if let Err(e) = reader.read_exact(&mut payload).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(Error::MissingData("connection closed mid-frame".to_owned()));
        }
        return Err(Error::IoError(e.kind()));
    }

    Ok((header.correlation_id, Bytes::from(payload)))
}

/// Write one frame to `writer` and flush it.
pub async fn write_frame<W>(writer: &mut W, correlation_id: u64, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(correlation_id, payload);
    writer
        .write_all(&frame)
        .await
        .map_err(|e| Error::IoError(e.kind()))?;
    writer.flush().await.map_err(|e| Error::IoError(e.kind()))?;
    Ok(())
}
