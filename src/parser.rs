//! Deserialize data from the wire protocol.
use bytes::Bytes;
use nom::{
    IResult,
    bytes::complete::take,
    multi::many_m_n,
    number::complete::{be_i32, be_u8, be_u16, be_u64},
};
use nombytes::NomBytes;

use crate::constants::MAX_PROTOCOL_ARRAY_SIZE;

/// Convert bytes to a validated UTF-8 string.
/// Returns an error if the bytes are not valid UTF-8.
pub fn bytes_to_string(bytes: &Bytes) -> Result<String, nom::Err<nom::error::Error<NomBytes>>> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(
                NomBytes::from(bytes.as_ref()),
                nom::error::ErrorKind::Verify,
            ))
        })
}

/// Parse an i16-length-prefixed string's raw bytes.
pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_u16(s)?;
    let (s, string) = take(length)(s)?;
    Ok((s, string.into_bytes()))
}

/// Parse an i32-length-prefixed byte blob (key material).
pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let i = s.clone();
    let (s, length) = be_i32(s)?;
    if !(0..=MAX_PROTOCOL_ARRAY_SIZE).contains(&length) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            i,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (s, bytes) = take(length as usize)(s)?;
    Ok((s, bytes.into_bytes()))
}

/// Parse an i32-count-prefixed protocol array with `f` per element.
pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let i = input.clone();
        let (i, length) = be_i32(i)?;

        // Null array
        if length == -1 {
            return Ok((i, vec![]));
        }

        // Validate array size bounds
        if !(0..=MAX_PROTOCOL_ARRAY_SIZE).contains(&length) {
            return Err(nom::Err::Failure(E::from_error_kind(
                i,
                nom::error::ErrorKind::TooLarge,
            )));
        }

        many_m_n(length as usize, length as usize, f)(i)
    }
}

/// Parse a u64 protocol value.
pub fn parse_u64(s: NomBytes) -> IResult<NomBytes, u64> {
    be_u64(s)
}

/// Parse a bool encoded as a single byte (0 = false, anything else = true).
pub fn parse_bool(s: NomBytes) -> IResult<NomBytes, bool> {
    let (s, b) = be_u8(s)?;
    Ok((s, b != 0))
}
