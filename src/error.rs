//! Crate & protocol level errors.
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Transport Layer (`crate::error`)
//!
//! - [`Error`]: connection, framing, and parsing errors. These terminate
//!   the connection that produced them.
//! - [`ErrorCode`]: wire protocol error codes carried inside response
//!   bodies. These travel back to the client with the original correlation
//!   id and leave the connection open (with the single exception of
//!   `NotLeader`, after which the server hangs up so the client
//!   re-resolves the leader).
//!
//! ## Cluster Layer (`crate::cluster::error`)
//!
//! - [`ClusterError`](crate::cluster::ClusterError): leadership, oracle,
//!   allocator, and metadata errors. Has `to_error_code()` for mapping to
//!   [`ErrorCode`].

use bytes::Bytes;
use num_derive::FromPrimitive;
use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Transport and protocol level errors.
///
/// These are low-level errors that occur during network I/O, frame
/// decoding, and request parsing. For leadership and metadata errors, see
/// [`crate::cluster::ClusterError`].
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the network.
    #[error("IO error: {0:?}")]
    IoError(io::ErrorKind),

    /// Could not parse the data.
    #[error("Parsing error: invalid data ({} bytes)", .0.len())]
    ParsingError(Bytes),

    /// Missing data or connection closed.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Frame opened with the wrong magic value.
    #[error("Bad frame magic: {0:#06x}")]
    BadMagic(u16),

    /// Frame declared an unsupported protocol version.
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Frame payload exceeds the configured cap.
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::IoError(a), Error::IoError(b)) => a == b,
            (Error::ParsingError(a), Error::ParsingError(b)) => a == b,
            (Error::MissingData(a), Error::MissingData(b)) => a == b,
            (Error::BadMagic(a), Error::BadMagic(b)) => a == b,
            (Error::UnsupportedVersion(a), Error::UnsupportedVersion(b)) => a == b,
            (
                Error::FrameTooLarge { size: a, max: am },
                Error::FrameTooLarge { size: b, max: bm },
            ) => a == b && am == bm,
            (Error::Config(a), Error::Config(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.kind())
    }
}

/// Typed error codes carried in wire responses.
///
/// The numeric values are part of the protocol; clients match on them to
/// decide whether to retry, re-resolve the leader, or give up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum ErrorCode {
    /// An unexpected server error.
    Unknown = -1,
    #[default]
    None = 0,
    /// The request landed on a replica that is not the current leader.
    /// The server closes the connection after this response so the client
    /// re-resolves the leader.
    NotLeader = 1,
    /// A cluster operation arrived before `Bootstrap`.
    NotBootstrapped = 2,
    /// A second `Bootstrap` attempt. Non-fatal; the cluster is usable.
    AlreadyBootstrapped = 3,
    /// The request is missing required fields or carries inconsistent ones.
    InvalidRequest = 4,
    /// The timestamp oracle is not ready (before sync, or mid-advance
    /// stall). Clients retry.
    TsoUnavailable = 5,
    /// A `Tso` request asked for more timestamps than the remaining
    /// logical capacity of the current millisecond.
    TsoOverflow = 6,
    /// No region contains the requested key.
    RegionNotFound = 7,
    /// The requested store does not exist.
    StoreNotFound = 8,
    /// A conflicting pending operation already exists for the region.
    ConflictingOperator = 9,
    /// Internal failure while serving the request.
    Internal = 10,
}
