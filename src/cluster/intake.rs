//! Region lifecycle intake: split and change-peer requests.
//!
//! A region's raft leader asks the placement driver to arbitrate two
//! kinds of lifecycle events. The driver validates the request, reserves
//! whatever fresh IDs the decision needs, and persists the decision as a
//! pending record under the region's key. Applying the decision happens
//! on the data nodes; a later store heartbeat reports the outcome, which
//! is outside this subsystem.
//!
//! Only one pending change-peer may exist per region; a conflicting
//! request is rejected. A repeated split request simply overwrites the
//! pending record with freshly reserved IDs.

use serde::{Deserialize, Serialize};

use crate::meta::{Compare, Txn, TxnOp};
use crate::model::{Peer, Region, key_display};
use crate::types::{PeerId, RegionId, StoreId};

use super::error::{ClusterError, ClusterResult};
use super::state::{ClusterState, to_json};

/// Direction of a pending change-peer decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangePeerKind {
    /// Grow the replica set onto a new store.
    AddPeer,
    /// Shrink the replica set by removing a peer.
    RemovePeer,
}

/// Persisted decision to split a region at a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSplit {
    pub region_id: RegionId,
    pub split_key: Vec<u8>,
    /// ID reserved for the new right-hand region.
    pub new_region_id: RegionId,
    /// One reserved peer ID per existing replica.
    pub new_peer_ids: Vec<PeerId>,
}

/// Persisted decision to add or remove one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChangePeer {
    pub region_id: RegionId,
    pub kind: ChangePeerKind,
    pub peer: Peer,
}

fn validate_claimed_leader(region: &Region, leader_store_id: StoreId) -> ClusterResult<()> {
    if !leader_store_id.is_valid() {
        return Err(ClusterError::InvalidRequest(
            "missing leader store id".to_string(),
        ));
    }
    if !region.peers.iter().any(|p| p.store_id == leader_store_id) {
        return Err(ClusterError::InvalidRequest(format!(
            "store {leader_store_id} holds no replica of region {}",
            region.id
        )));
    }
    Ok(())
}

impl ClusterState {
    /// Arbitrate a split request: validate, reserve IDs, persist the
    /// decision. Returns the reserved region ID and peer IDs for the
    /// caller to use when it executes the split.
    pub async fn handle_ask_split(
        &self,
        region: &Region,
        leader_store_id: StoreId,
        split_key: &[u8],
    ) -> ClusterResult<(RegionId, Vec<PeerId>)> {
        self.gate_bootstrapped()?;

        let current = self.region_by_id(region.id)?;
        validate_claimed_leader(&current, leader_store_id)?;

        if split_key.is_empty() {
            return Err(ClusterError::InvalidRequest(
                "missing split key".to_string(),
            ));
        }
        // The split key must fall strictly inside the range; splitting at
        // the start key would create an empty left half.
        if split_key == current.start_key.as_slice() || !current.contains(split_key) {
            return Err(ClusterError::InvalidRequest(format!(
                "split key {} is outside region {} range [{}, {})",
                key_display(split_key),
                current.id,
                key_display(&current.start_key),
                key_display(&current.end_key),
            )));
        }

        let new_region_id = RegionId::new(self.alloc.alloc().await?);
        let mut new_peer_ids = Vec::with_capacity(current.peers.len());
        for _ in &current.peers {
            new_peer_ids.push(PeerId::new(self.alloc.alloc().await?));
        }

        let pending = PendingSplit {
            region_id: current.id,
            split_key: split_key.to_vec(),
            new_region_id,
            new_peer_ids: new_peer_ids.clone(),
        };

        let txn = Txn::new().when(self.lock.guard()).then(TxnOp::put(
            self.layout.pending_split(current.id),
            to_json(&pending),
        ));
        if !self.meta.txn(txn).await?.succeeded {
            return Err(ClusterError::LeadershipLost);
        }

        tracing::info!(
            region = %current.id,
            new_region = %new_region_id,
            split_key = %key_display(split_key),
            "split decision recorded"
        );
        Ok((new_region_id, new_peer_ids))
    }

    /// Arbitrate a change-peer request: pick a direction from the
    /// replica count, consult the placement policy for the target, and
    /// persist the decision. At most one pending change-peer per region.
    pub async fn handle_ask_change_peer(
        &self,
        region: &Region,
        leader_store_id: StoreId,
    ) -> ClusterResult<()> {
        self.gate_bootstrapped()?;

        let current = self.region_by_id(region.id)?;
        validate_claimed_leader(&current, leader_store_id)?;

        let meta = self.get_meta()?;
        let counts = self.replica_counts();

        let pending = if (current.peers.len() as u32) < meta.max_replicas {
            let stores = self.stores_snapshot();
            let target = self
                .placement
                .pick_store_for_new_peer(&stores, &current, &counts)
                .ok_or_else(|| {
                    ClusterError::InvalidRequest(format!(
                        "no store can host a new replica of region {}",
                        current.id
                    ))
                })?;
            let peer = Peer {
                peer_id: PeerId::new(self.alloc.alloc().await?),
                store_id: target,
            };
            PendingChangePeer {
                region_id: current.id,
                kind: ChangePeerKind::AddPeer,
                peer,
            }
        } else {
            let peer = self
                .placement
                .pick_peer_to_remove(&current, &counts)
                .ok_or_else(|| {
                    ClusterError::InvalidRequest(format!(
                        "region {} has no removable replica",
                        current.id
                    ))
                })?;
            PendingChangePeer {
                region_id: current.id,
                kind: ChangePeerKind::RemovePeer,
                peer,
            }
        };

        let pending_key = self.layout.pending_change_peer(current.id);
        let txn = Txn::new()
            .when(Compare::absent(pending_key.clone()))
            .when(self.lock.guard())
            .then(TxnOp::put(pending_key.clone(), to_json(&pending)));

        if !self.meta.txn(txn).await?.succeeded {
            if self.meta.get(&pending_key).await?.is_some() {
                return Err(ClusterError::ConflictingOperator(current.id));
            }
            return Err(ClusterError::LeadershipLost);
        }

        tracing::info!(
            region = %current.id,
            kind = ?pending.kind,
            peer = %pending.peer.peer_id,
            store = %pending.peer.store_id,
            "change-peer decision recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_split_json_roundtrip() {
        let pending = PendingSplit {
            region_id: RegionId::new(4),
            split_key: b"m".to_vec(),
            new_region_id: RegionId::new(9),
            new_peer_ids: vec![PeerId::new(10), PeerId::new(11)],
        };
        let bytes = serde_json::to_vec(&pending).unwrap();
        let back: PendingSplit = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, pending);
    }

    #[test]
    fn pending_change_peer_json_roundtrip() {
        let pending = PendingChangePeer {
            region_id: RegionId::new(4),
            kind: ChangePeerKind::AddPeer,
            peer: Peer {
                peer_id: PeerId::new(12),
                store_id: StoreId::new(3),
            },
        };
        let bytes = serde_json::to_vec(&pending).unwrap();
        let back: PendingChangePeer = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, pending);
    }
}
