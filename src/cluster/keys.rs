//! Key layout for placement-driver state in the meta store.
//!
//! Everything the driver persists lives under one root path so multiple
//! clusters can share a store:
//!
//! ```text
//! <root>/leader                                leader record, lease-attached
//! <root>/tso/saved_ts                          TSO checkpoint, 8-byte BE millis
//! <root>/alloc_id                              allocator upper bound, 8-byte BE
//! <root>/bootstrap                             bootstrap marker
//! <root>/cluster/meta                          cluster config json
//! <root>/cluster/stores/<store id>             store record json
//! <root>/cluster/regions/<region id>           region record json
//! <root>/cluster/regions/<region id>/split     pending split json
//! <root>/cluster/regions/<region id>/change_peer  pending change-peer json
//! ```
//!
//! IDs are zero-padded to 20 digits so lexicographic prefix scans return
//! records in numeric order. Pending-operation keys nest under their
//! region's key; region scans filter them out by suffix.

use crate::types::{RegionId, StoreId};

/// Suffix of a pending-split key.
pub const SPLIT_SUFFIX: &str = "/split";

/// Suffix of a pending change-peer key.
pub const CHANGE_PEER_SUFFIX: &str = "/change_peer";

/// Key layout rooted at a cluster's path prefix.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    root: String,
}

impl KeyLayout {
    /// Create a layout under `root` (trailing slashes stripped).
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.ends_with('/') {
            root.pop();
        }
        Self { root }
    }

    /// The root path itself.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The leader key.
    pub fn leader(&self) -> String {
        format!("{}/leader", self.root)
    }

    /// The timestamp-oracle checkpoint key.
    pub fn timestamp(&self) -> String {
        format!("{}/tso/saved_ts", self.root)
    }

    /// The ID-allocator bound key.
    pub fn alloc_id(&self) -> String {
        format!("{}/alloc_id", self.root)
    }

    /// The bootstrap marker key.
    pub fn bootstrap(&self) -> String {
        format!("{}/bootstrap", self.root)
    }

    /// The cluster config key.
    pub fn cluster_meta(&self) -> String {
        format!("{}/cluster/meta", self.root)
    }

    /// Prefix under which store records live.
    pub fn store_prefix(&self) -> String {
        format!("{}/cluster/stores/", self.root)
    }

    /// Key of one store record.
    pub fn store(&self, id: StoreId) -> String {
        format!("{}{:020}", self.store_prefix(), id.value())
    }

    /// Prefix under which region records (and pending operations) live.
    pub fn region_prefix(&self) -> String {
        format!("{}/cluster/regions/", self.root)
    }

    /// Key of one region record.
    pub fn region(&self, id: RegionId) -> String {
        format!("{}{:020}", self.region_prefix(), id.value())
    }

    /// Key of a region's pending-split record.
    pub fn pending_split(&self, id: RegionId) -> String {
        format!("{}{}", self.region(id), SPLIT_SUFFIX)
    }

    /// Key of a region's pending change-peer record.
    pub fn pending_change_peer(&self, id: RegionId) -> String {
        format!("{}{}", self.region(id), CHANGE_PEER_SUFFIX)
    }

    /// Whether a key under the region prefix is a region record proper,
    /// rather than a nested pending-operation record.
    pub fn is_region_record(key: &str) -> bool {
        !key.ends_with(SPLIT_SUFFIX) && !key.ends_with(CHANGE_PEER_SUFFIX)
    }
}
