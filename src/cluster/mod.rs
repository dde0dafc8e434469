//! Leader-only subsystems of the placement driver.
//!
//! Everything in this module is owned by the current leadership term. The
//! election loop (in [`crate::server::leader`]) builds a fresh set of
//! [`LeaderHandles`] — timestamp oracle, ID allocator, cluster state —
//! after winning a campaign, publishes them through [`ControlCore`], and
//! drops them deterministically on demotion. Followers hold no
//! authoritative state and serve no requests.
//!
//! # Write fencing
//!
//! Every persistent mutation goes through a transaction carrying
//! [`LeaderLock::guard`]: a comparison of the leader key's current value
//! against this leader's marshalled record. A deposed leader's writes
//! fail the comparison and have no side effect; the caller sees
//! [`ClusterError::LeadershipLost`] and the term ends. This is the sole
//! mechanism keeping a stale leader from corrupting shared state.

pub mod alloc;
mod config;
mod error;
mod handler;
mod intake;
pub mod keys;
pub mod metrics;
pub mod placement;
pub mod retry;
mod state;
pub mod tso;

pub use alloc::IdAllocator;
pub use config::Config;
pub use error::{ClusterError, ClusterResult};
pub use handler::ControlHandler;
pub use intake::{ChangePeerKind, PendingChangePeer, PendingSplit};
pub use keys::KeyLayout;
pub use placement::{BalancedPlacement, PlacementPolicy};
pub use state::{ClusterState, RangeIndex};
pub use tso::TimestampOracle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::meta::{Compare, MetaClient, MetaStore};
use crate::model::LeaderRecord;

/// The leader key and this leader's marshalled record.
///
/// Shared by every leader-only subsystem; its [`guard`](Self::guard) is
/// the comparison prepended to all of their transactions.
#[derive(Debug, Clone)]
pub struct LeaderLock {
    key: String,
    record: Bytes,
}

impl LeaderLock {
    /// Bind a leader key to a marshalled leader record.
    pub fn new(key: impl Into<String>, record: Bytes) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }

    /// The leader key path.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// This leader's marshalled record.
    pub fn record(&self) -> &Bytes {
        &self.record
    }

    /// The fencing comparison: the leader key still holds our record.
    pub fn guard(&self) -> Compare {
        Compare::value_eq(self.key.clone(), self.record.clone())
    }
}

/// The subsystems owned by one leadership term.
pub struct LeaderHandles {
    pub lock: Arc<LeaderLock>,
    pub tso: TimestampOracle,
    pub alloc: Arc<IdAllocator>,
    pub state: ClusterState,
}

/// Shared core of one placement-driver replica.
///
/// Holds what outlives leadership terms: configuration, the meta-store
/// client, the key layout, and the currently published leader handles
/// (if any).
pub struct ControlCore {
    config: Config,
    meta: MetaClient,
    layout: KeyLayout,
    is_leader: AtomicBool,
    handles: RwLock<Option<Arc<LeaderHandles>>>,
}

impl ControlCore {
    /// Build a replica core over a meta-store backend.
    pub fn new(config: Config, store: Arc<dyn MetaStore>) -> Self {
        let meta = MetaClient::new(store, config.request_timeout());
        let layout = KeyLayout::new(config.root_path.clone());
        Self {
            config,
            meta,
            layout,
            is_leader: AtomicBool::new(false),
            handles: RwLock::new(None),
        }
    }

    /// Replica configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Timeout-wrapped meta-store client.
    pub fn meta(&self) -> &MetaClient {
        &self.meta
    }

    /// Key layout under the configured root path.
    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Whether this replica currently holds leadership.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// The current term's subsystems, or `NotLeader`.
    pub fn leader_handles(&self) -> ClusterResult<Arc<LeaderHandles>> {
        self.handles
            .read()
            .expect("leader handles lock poisoned")
            .clone()
            .ok_or(ClusterError::NotLeader)
    }

    /// Publish a freshly built term. Called by the election loop after
    /// the oracle is synced and cluster state is loaded.
    pub(crate) fn publish_leader(&self, handles: Arc<LeaderHandles>) {
        *self.handles.write().expect("leader handles lock poisoned") = Some(handles);
        self.is_leader.store(true, Ordering::SeqCst);
    }

    /// Drop the current term's subsystems. Called on any exit from the
    /// leader state, before client connections are closed.
    pub(crate) fn clear_leader(&self) {
        self.is_leader.store(false, Ordering::SeqCst);
        *self.handles.write().expect("leader handles lock poisoned") = None;
    }

    /// Read the current leader record from the meta store, if any.
    pub async fn current_leader(&self) -> ClusterResult<Option<LeaderRecord>> {
        let key = self.layout.leader();
        match self.meta.get(&key).await? {
            None => Ok(None),
            Some(kv) => {
                let record =
                    serde_json::from_slice(&kv.value).map_err(|e| ClusterError::Corrupt {
                        key,
                        reason: e.to_string(),
                    })?;
                Ok(Some(record))
            }
        }
    }
}
