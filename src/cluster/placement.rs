//! Placement policy seam.
//!
//! Deciding *which* store gains or loses a replica is the scheduler's
//! business, an external collaborator as far as the intake path is
//! concerned. The trait below is that boundary; [`BalancedPlacement`] is
//! the in-crate default, which spreads replicas by count.

use std::collections::HashMap;

use crate::model::{Peer, Region, Store, StoreState};
use crate::types::StoreId;

/// Chooses targets for change-peer decisions.
pub trait PlacementPolicy: Send + Sync {
    /// Pick a store to host a new replica of `region`, or `None` when no
    /// store is eligible. `replica_counts` maps stores to the number of
    /// replicas they currently host across all regions.
    fn pick_store_for_new_peer(
        &self,
        stores: &[Store],
        region: &Region,
        replica_counts: &HashMap<StoreId, usize>,
    ) -> Option<StoreId>;

    /// Pick an existing replica of `region` to remove, or `None` when the
    /// region has no removable peer.
    fn pick_peer_to_remove(
        &self,
        region: &Region,
        replica_counts: &HashMap<StoreId, usize>,
    ) -> Option<Peer>;
}

/// Default policy: add to the least-loaded eligible store, remove from
/// the most-loaded one.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedPlacement;

impl PlacementPolicy for BalancedPlacement {
    fn pick_store_for_new_peer(
        &self,
        stores: &[Store],
        region: &Region,
        replica_counts: &HashMap<StoreId, usize>,
    ) -> Option<StoreId> {
        stores
            .iter()
            .filter(|store| store.state == StoreState::Up)
            .filter(|store| !region.peers.iter().any(|p| p.store_id == store.id))
            .min_by_key(|store| {
                (
                    replica_counts.get(&store.id).copied().unwrap_or(0),
                    store.id,
                )
            })
            .map(|store| store.id)
    }

    fn pick_peer_to_remove(
        &self,
        region: &Region,
        replica_counts: &HashMap<StoreId, usize>,
    ) -> Option<Peer> {
        region
            .peers
            .iter()
            .max_by_key(|peer| {
                (
                    replica_counts.get(&peer.store_id).copied().unwrap_or(0),
                    peer.peer_id,
                )
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PeerId, RegionId};

    fn store(id: u64, state: StoreState) -> Store {
        Store {
            id: StoreId::new(id),
            address: format!("s{id}:20160"),
            capacity: 0,
            state,
        }
    }

    fn region_on(stores: &[u64]) -> Region {
        Region {
            id: RegionId::new(1),
            start_key: vec![],
            end_key: vec![],
            peers: stores
                .iter()
                .enumerate()
                .map(|(i, s)| Peer {
                    peer_id: PeerId::new(100 + i as u64),
                    store_id: StoreId::new(*s),
                })
                .collect(),
            leader_hint: StoreId::new(stores[0]),
        }
    }

    #[test]
    fn new_peer_avoids_existing_replicas() {
        let stores = vec![store(1, StoreState::Up), store(2, StoreState::Up)];
        let region = region_on(&[1]);
        let counts = HashMap::new();
        let picked = BalancedPlacement
            .pick_store_for_new_peer(&stores, &region, &counts)
            .unwrap();
        assert_eq!(picked, StoreId::new(2));
    }

    #[test]
    fn new_peer_prefers_least_loaded() {
        let stores = vec![
            store(2, StoreState::Up),
            store(3, StoreState::Up),
            store(4, StoreState::Up),
        ];
        let region = region_on(&[1]);
        let mut counts = HashMap::new();
        counts.insert(StoreId::new(2), 5);
        counts.insert(StoreId::new(3), 1);
        counts.insert(StoreId::new(4), 3);
        let picked = BalancedPlacement
            .pick_store_for_new_peer(&stores, &region, &counts)
            .unwrap();
        assert_eq!(picked, StoreId::new(3));
    }

    #[test]
    fn new_peer_skips_non_up_stores() {
        let stores = vec![
            store(2, StoreState::Offline),
            store(3, StoreState::Tombstone),
        ];
        let region = region_on(&[1]);
        assert!(BalancedPlacement
            .pick_store_for_new_peer(&stores, &region, &HashMap::new())
            .is_none());
    }

    #[test]
    fn remove_targets_most_loaded_store() {
        let region = region_on(&[1, 2, 3]);
        let mut counts = HashMap::new();
        counts.insert(StoreId::new(1), 1);
        counts.insert(StoreId::new(2), 9);
        counts.insert(StoreId::new(3), 4);
        let victim = BalancedPlacement
            .pick_peer_to_remove(&region, &counts)
            .unwrap();
        assert_eq!(victim.store_id, StoreId::new(2));
    }

    #[test]
    fn remove_from_empty_region_is_none() {
        let region = Region {
            id: RegionId::new(1),
            start_key: vec![],
            end_key: vec![],
            peers: vec![],
            leader_hint: StoreId::new(0),
        };
        assert!(BalancedPlacement
            .pick_peer_to_remove(&region, &HashMap::new())
            .is_none());
    }
}
