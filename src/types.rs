//! Type-safe wrappers for protocol primitives.
//!
//! These newtypes prevent mixing up the different 64-bit identifiers that
//! flow through the placement driver (stores, regions, peers) and give the
//! hybrid timestamp its lexicographic ordering.

use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encode::ToByte;
use crate::error::Result;

/// Identifier of a store (data node) in the cluster.
///
/// Store IDs are issued by the ID allocator and are never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StoreId(pub u64);

impl StoreId {
    /// Create a new store ID from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        StoreId(value)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check if this is a valid (non-zero) store ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for StoreId {
    fn from(value: u64) -> Self {
        StoreId(value)
    }
}

impl From<StoreId> for u64 {
    fn from(id: StoreId) -> Self {
        id.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for StoreId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// Identifier of a region (a contiguous key range and its replica set).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RegionId(pub u64);

impl RegionId {
    /// Create a new region ID from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        RegionId(value)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check if this is a valid (non-zero) region ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for RegionId {
    fn from(value: u64) -> Self {
        RegionId(value)
    }
}

impl From<RegionId> for u64 {
    fn from(id: RegionId) -> Self {
        id.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for RegionId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// Identifier of one replica of a region, unique cluster-wide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Create a new peer ID from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        PeerId(value)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for PeerId {
    fn from(value: u64) -> Self {
        PeerId(value)
    }
}

impl From<PeerId> for u64 {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for PeerId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A hybrid timestamp issued by the timestamp oracle.
///
/// `physical` is wall-clock milliseconds since the Unix epoch; `logical`
/// is a 0-based counter within that millisecond. Ordering is lexicographic
/// on `(physical, logical)`, which the derived `Ord` provides given the
/// field order below. Every timestamp the cluster ever issues is strictly
/// greater than every one issued before it, across leader changes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Milliseconds since the Unix epoch.
    pub physical: i64,
    /// Counter within the millisecond.
    pub logical: u32,
}

impl Timestamp {
    /// Create a timestamp from its parts.
    #[inline]
    pub const fn new(physical: i64, logical: u32) -> Self {
        Timestamp { physical, logical }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical, self.logical)
    }
}

impl ToByte for Timestamp {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.physical.encode(buffer)?;
        self.logical.encode(buffer)
    }
}
