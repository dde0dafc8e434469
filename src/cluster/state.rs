//! Authoritative cluster state: bootstrap gate, stores, regions.
//!
//! The leader holds the only authoritative in-memory copy, rebuilt from
//! the meta store on every leadership acquisition. Lookups vastly
//! outnumber mutations, so everything sits behind one reader/writer lock,
//! held only across map access, never across a meta-store call: mutations
//! validate under the lock, persist unlocked through a guarded
//! transaction, and publish the new value under the lock afterwards.
//!
//! The range index maps region start keys to region IDs. After any
//! mutation the set of regions partitions the key space with no gaps and
//! no overlaps; [`RangeIndex::validate`] checks exactly that.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use backon::Retryable;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::encode::encode_u64;
use crate::meta::{Compare, MetaClient, Txn, TxnOp};
use crate::model::{ClusterMeta, Region, Store, StoreState, key_display};
use crate::types::{RegionId, StoreId};

use super::error::{ClusterError, ClusterResult};
use super::keys::KeyLayout;
use super::placement::PlacementPolicy;
use super::{IdAllocator, LeaderLock};

pub(crate) fn to_json<T: Serialize>(value: &T) -> Bytes {
    Bytes::from(serde_json::to_vec(value).expect("cluster record serializes"))
}

pub(crate) fn from_json<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> ClusterResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ClusterError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Sorted index from region start keys to region IDs.
#[derive(Debug, Default)]
pub struct RangeIndex {
    by_start: BTreeMap<Vec<u8>, RegionId>,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    pub fn insert(&mut self, region: &Region) {
        self.by_start.insert(region.start_key.clone(), region.id);
    }

    pub fn remove(&mut self, region: &Region) {
        if self.by_start.get(&region.start_key) == Some(&region.id) {
            self.by_start.remove(&region.start_key);
        }
    }

    /// The region whose start key is the greatest one not above `key`.
    /// The caller still verifies containment against the region's end.
    pub fn locate(&self, key: &[u8]) -> Option<RegionId> {
        self.by_start
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .map(|(_, id)| *id)
    }

    /// Check that the indexed regions partition the key space: the first
    /// starts at -∞, each region begins where its predecessor ends, and
    /// the last runs to +∞.
    pub fn validate(&self, regions: &HashMap<RegionId, Region>) -> Result<(), String> {
        if self.by_start.is_empty() {
            return Err("range index is empty".to_string());
        }

        let mut expected_start: Option<Vec<u8>> = Some(Vec::new());
        for (start, id) in &self.by_start {
            let region = regions
                .get(id)
                .ok_or_else(|| format!("index references unknown region {id}"))?;
            if &region.start_key != start {
                return Err(format!("region {id} indexed under the wrong start key"));
            }
            match expected_start.take() {
                None => {
                    return Err(format!(
                        "region {id} begins after the key space already ended"
                    ));
                }
                Some(expected) if expected != *start => {
                    return Err(format!(
                        "gap or overlap before region {id}: expected start {}, found {}",
                        key_display(&expected),
                        key_display(start)
                    ));
                }
                Some(_) => {}
            }
            expected_start = if region.end_key.is_empty() {
                None
            } else {
                Some(region.end_key.clone())
            };
        }

        match expected_start {
            None => Ok(()),
            Some(tail) => Err(format!(
                "key space not covered past {}",
                key_display(&tail)
            )),
        }
    }
}

#[derive(Default)]
struct StateInner {
    bootstrapped: bool,
    meta: Option<ClusterMeta>,
    stores: HashMap<StoreId, Store>,
    regions: HashMap<RegionId, Region>,
    index: RangeIndex,
}

/// Cluster state for one leadership term.
pub struct ClusterState {
    pub(crate) meta: MetaClient,
    pub(crate) lock: Arc<LeaderLock>,
    pub(crate) layout: KeyLayout,
    pub(crate) alloc: Arc<IdAllocator>,
    pub(crate) placement: Arc<dyn PlacementPolicy>,
    cluster_id: u64,
    default_max_replicas: u32,
    inner: RwLock<StateInner>,
}

impl ClusterState {
    pub fn new(
        meta: MetaClient,
        lock: Arc<LeaderLock>,
        layout: KeyLayout,
        alloc: Arc<IdAllocator>,
        placement: Arc<dyn PlacementPolicy>,
        cluster_id: u64,
        default_max_replicas: u32,
    ) -> Self {
        Self {
            meta,
            lock,
            layout,
            alloc,
            placement,
            cluster_id,
            default_max_replicas,
            inner: RwLock::new(StateInner::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StateInner> {
        self.inner.read().expect("cluster state lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StateInner> {
        self.inner.write().expect("cluster state lock poisoned")
    }

    /// Rebuild the in-memory state from the meta store. Called once per
    /// leadership acquisition, before traffic is accepted.
    pub async fn load(&self) -> ClusterResult<()> {
        let bootstrap_key = self.layout.bootstrap();
        let bootstrapped = (|| async { self.meta.get(&bootstrap_key).await })
            .retry(super::retry::meta_policy())
            .await?
            .is_some();

        let mut next = StateInner {
            bootstrapped,
            ..StateInner::default()
        };

        if bootstrapped {
            let meta_key = self.layout.cluster_meta();
            match self.meta.get(&meta_key).await? {
                Some(kv) => next.meta = Some(from_json(&meta_key, &kv.value)?),
                None => {
                    return Err(ClusterError::Corrupt {
                        key: meta_key,
                        reason: "bootstrapped cluster has no config record".to_string(),
                    });
                }
            }

            let store_prefix = self.layout.store_prefix();
            for kv in (|| async { self.meta.get_prefix(&store_prefix).await })
                .retry(super::retry::meta_policy())
                .await?
            {
                let store: Store = from_json(&kv.key, &kv.value)?;
                next.stores.insert(store.id, store);
            }

            let region_prefix = self.layout.region_prefix();
            for kv in (|| async { self.meta.get_prefix(&region_prefix).await })
                .retry(super::retry::meta_policy())
                .await?
            {
                // Pending-operation records nest under region keys.
                if !KeyLayout::is_region_record(&kv.key) {
                    continue;
                }
                let region: Region = from_json(&kv.key, &kv.value)?;
                next.index.insert(&region);
                next.regions.insert(region.id, region);
            }

            if let Err(violation) = next.index.validate(&next.regions) {
                tracing::warn!(%violation, "range index invariant violated in loaded state");
            }
        }

        tracing::info!(
            bootstrapped,
            stores = next.stores.len(),
            regions = next.regions.len(),
            "cluster state loaded"
        );

        *self.write() = next;
        Ok(())
    }

    pub(crate) fn gate_bootstrapped(&self) -> ClusterResult<()> {
        if self.read().bootstrapped {
            Ok(())
        } else {
            Err(ClusterError::NotBootstrapped)
        }
    }

    /// Whether the cluster has been bootstrapped.
    pub fn is_bootstrapped(&self) -> bool {
        self.read().bootstrapped
    }

    /// One-shot cluster initialisation: the bootstrap marker, cluster
    /// config, initial store, and first region go in atomically, guarded
    /// on the marker not existing yet.
    pub async fn bootstrap(&self, store: Store, region: Region) -> ClusterResult<()> {
        if !store.id.is_valid() {
            return Err(ClusterError::InvalidRequest(
                "bootstrap store id must be non-zero".to_string(),
            ));
        }
        if store.address.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "bootstrap store address must not be empty".to_string(),
            ));
        }
        if !region.id.is_valid() {
            return Err(ClusterError::InvalidRequest(
                "bootstrap region id must be non-zero".to_string(),
            ));
        }
        if !region.covers_everything() {
            return Err(ClusterError::InvalidRequest(
                "bootstrap region must cover the entire key space".to_string(),
            ));
        }
        if region.peers.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "bootstrap region must carry at least one peer".to_string(),
            ));
        }
        if region.peers.iter().any(|p| p.store_id != store.id) {
            return Err(ClusterError::InvalidRequest(
                "bootstrap region peers must live on the bootstrap store".to_string(),
            ));
        }

        let meta = ClusterMeta {
            cluster_id: self.cluster_id,
            max_replicas: self.default_max_replicas,
        };

        let bootstrap_key = self.layout.bootstrap();
        let txn = Txn::new()
            .when(Compare::absent(bootstrap_key.clone()))
            .when(self.lock.guard())
            .then(TxnOp::put(
                bootstrap_key.clone(),
                encode_u64(self.cluster_id).to_vec(),
            ))
            .then(TxnOp::put(self.layout.cluster_meta(), to_json(&meta)))
            .then(TxnOp::put(self.layout.store(store.id), to_json(&store)))
            .then(TxnOp::put(self.layout.region(region.id), to_json(&region)));

        if !self.meta.txn(txn).await?.succeeded {
            // Either someone bootstrapped first or leadership moved; a
            // present marker identifies the benign case.
            if self.meta.get(&bootstrap_key).await?.is_some() {
                let mut inner = self.write();
                inner.bootstrapped = true;
                return Err(ClusterError::AlreadyBootstrapped);
            }
            return Err(ClusterError::LeadershipLost);
        }

        tracing::info!(
            store = %store.id,
            region = %region.id,
            "cluster bootstrapped"
        );

        let mut inner = self.write();
        inner.bootstrapped = true;
        inner.meta = Some(meta);
        inner.stores.insert(store.id, store);
        inner.index.insert(&region);
        inner.regions.insert(region.id, region);
        Ok(())
    }

    /// Fetch a store record.
    pub fn get_store(&self, id: StoreId) -> ClusterResult<Store> {
        self.gate_bootstrapped()?;
        if !id.is_valid() {
            return Err(ClusterError::InvalidRequest(
                "store id must be non-zero".to_string(),
            ));
        }
        self.read()
            .stores
            .get(&id)
            .cloned()
            .ok_or(ClusterError::StoreNotFound(id))
    }

    /// Create or update a store record.
    pub async fn put_store(&self, store: Store) -> ClusterResult<()> {
        self.gate_bootstrapped()?;
        if !store.id.is_valid() {
            return Err(ClusterError::InvalidRequest(
                "store id must be non-zero".to_string(),
            ));
        }
        if store.address.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "store address must not be empty".to_string(),
            ));
        }
        if store.state == StoreState::Tombstone {
            return Err(ClusterError::InvalidRequest(
                "cannot put a tombstoned store".to_string(),
            ));
        }

        let txn = Txn::new()
            .when(self.lock.guard())
            .then(TxnOp::put(self.layout.store(store.id), to_json(&store)));
        if !self.meta.txn(txn).await?.succeeded {
            return Err(ClusterError::LeadershipLost);
        }

        self.write().stores.insert(store.id, store);
        Ok(())
    }

    /// The region containing `key`.
    pub fn get_region(&self, key: &[u8]) -> ClusterResult<Region> {
        self.gate_bootstrapped()?;
        let inner = self.read();
        let id = inner.index.locate(key).ok_or(ClusterError::RegionNotFound)?;
        let region = inner
            .regions
            .get(&id)
            .ok_or(ClusterError::RegionNotFound)?;
        if region.contains(key) {
            Ok(region.clone())
        } else {
            Err(ClusterError::RegionNotFound)
        }
    }

    /// A region by its id, for intake validation.
    pub fn region_by_id(&self, id: RegionId) -> ClusterResult<Region> {
        self.gate_bootstrapped()?;
        self.read()
            .regions
            .get(&id)
            .cloned()
            .ok_or(ClusterError::RegionUnknown(id))
    }

    /// The cluster config record.
    pub fn get_meta(&self) -> ClusterResult<ClusterMeta> {
        self.gate_bootstrapped()?;
        self.read().meta.ok_or(ClusterError::NotBootstrapped)
    }

    /// Replace the cluster config record.
    pub async fn put_meta(&self, meta: ClusterMeta) -> ClusterResult<()> {
        self.gate_bootstrapped()?;
        if meta.max_replicas == 0 {
            return Err(ClusterError::InvalidRequest(
                "max_replicas must be positive".to_string(),
            ));
        }
        if meta.cluster_id != self.cluster_id {
            return Err(ClusterError::InvalidRequest(format!(
                "cluster id mismatch: this cluster is {}",
                self.cluster_id
            )));
        }

        let txn = Txn::new()
            .when(self.lock.guard())
            .then(TxnOp::put(self.layout.cluster_meta(), to_json(&meta)));
        if !self.meta.txn(txn).await?.succeeded {
            return Err(ClusterError::LeadershipLost);
        }

        self.write().meta = Some(meta);
        Ok(())
    }

    /// All known stores.
    pub fn stores_snapshot(&self) -> Vec<Store> {
        self.read().stores.values().cloned().collect()
    }

    /// Replicas hosted per store, across all regions.
    pub(crate) fn replica_counts(&self) -> HashMap<StoreId, usize> {
        let inner = self.read();
        let mut counts: HashMap<StoreId, usize> = HashMap::new();
        for region in inner.regions.values() {
            for peer in &region.peers {
                *counts.entry(peer.store_id).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Validate the range-index invariant over the current state.
    pub fn check_range_invariant(&self) -> Result<(), String> {
        let inner = self.read();
        inner.index.validate(&inner.regions)
    }
}
