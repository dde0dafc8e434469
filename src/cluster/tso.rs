//! The timestamp oracle.
//!
//! Issues hybrid `(physical, logical)` timestamps that are strictly
//! increasing across the cluster's entire lifetime, leader failovers
//! included. Durability comes from one checkpoint key in the meta store
//! holding the largest physical time any leader has promised to issue:
//!
//! - On leadership acquisition, [`TimestampOracle::sync`] reads the
//!   checkpoint and starts strictly above it, then pushes the checkpoint
//!   `save_interval` ahead before the first timestamp is issued.
//! - A 50 ms tick calls [`TimestampOracle::advance`], following the wall
//!   clock and refreshing the checkpoint when less than half the window
//!   of headroom remains.
//! - [`TimestampOracle::timestamps`] hands out batches under a mutex held
//!   only for the counter arithmetic.
//!
//! The checkpoint write is fenced on the leader key, so a deposed leader
//! cannot move it; its own next checkpoint write fails instead, and the
//! term ends.
//!
//! The wall clock going backwards never lowers anything: the in-memory
//! physical only moves forward, and the logical counter absorbs issuance
//! inside a stalled millisecond.

use std::sync::Arc;
use std::sync::Mutex;

use crate::encode::{decode_u64, encode_u64};
use crate::meta::{MetaClient, Txn, TxnOp};
use crate::types::Timestamp;

use super::error::{ClusterError, ClusterResult};
use super::metrics;
use super::LeaderLock;

/// Current wall-clock milliseconds since the Unix epoch.
fn physical_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy)]
struct TsoState {
    /// Current physical millisecond. 0 until the first sync.
    physical: i64,
    /// Last logical value issued within `physical`.
    logical: u32,
    /// Persisted upper bound; no timestamp may carry physical beyond it.
    saved: i64,
}

/// The oracle for one leadership term.
pub struct TimestampOracle {
    meta: MetaClient,
    lock: Arc<LeaderLock>,
    key: String,
    save_interval_ms: i64,
    max_logical: u32,
    state: Mutex<TsoState>,
}

impl TimestampOracle {
    /// Build an unsynced oracle. It refuses to issue until
    /// [`sync`](Self::sync) succeeds.
    pub fn new(
        meta: MetaClient,
        lock: Arc<LeaderLock>,
        key: String,
        save_interval_ms: u64,
        max_logical: u32,
    ) -> Self {
        Self {
            meta,
            lock,
            key,
            save_interval_ms: save_interval_ms as i64,
            max_logical,
            state: Mutex::new(TsoState {
                physical: 0,
                logical: 0,
                saved: 0,
            }),
        }
    }

    /// Write a new checkpoint, fenced on the leader key.
    async fn persist(&self, saved: i64) -> ClusterResult<()> {
        let txn = Txn::new()
            .when(self.lock.guard())
            .then(TxnOp::put(self.key.clone(), encode_u64(saved as u64).to_vec()));
        let outcome = self.meta.txn(txn).await?;
        if !outcome.succeeded {
            return Err(ClusterError::LeadershipLost);
        }
        Ok(())
    }

    /// One-shot synchronisation on leadership acquisition.
    ///
    /// Must complete before any timestamp is issued. The new physical
    /// starts strictly above the persisted checkpoint, which is strictly
    /// above anything the previous leader could legally have issued; this
    /// also covers a leader whose clock runs behind its predecessor's.
    pub async fn sync(&self) -> ClusterResult<()> {
        let last = match self.meta.get(&self.key).await? {
            None => 0,
            Some(kv) => decode_u64(&kv.value).ok_or_else(|| ClusterError::Corrupt {
                key: self.key.clone(),
                reason: "checkpoint shorter than 8 bytes".to_string(),
            })? as i64,
        };

        let now = physical_now();
        let next = if now > last { now } else { last + 1 };
        let saved = next + self.save_interval_ms;

        self.persist(saved).await?;

        let mut state = self.state.lock().expect("tso lock poisoned");
        state.physical = next;
        state.logical = 0;
        state.saved = saved;

        tracing::info!(
            physical = next,
            checkpoint = saved,
            "timestamp oracle synced"
        );
        Ok(())
    }

    /// Periodic advance, driven by the leader loop's tick.
    ///
    /// Follows the wall clock forward and refreshes the checkpoint when
    /// less than half the save interval of headroom remains. The mutex is
    /// released across the checkpoint write; the new bound is published
    /// after the write succeeds.
    pub async fn advance(&self) -> ClusterResult<()> {
        let now = physical_now();

        let pending_save = {
            let mut state = self.state.lock().expect("tso lock poisoned");
            if now > state.physical {
                state.physical = now;
                state.logical = 0;
            }
            if state.saved - state.physical < self.save_interval_ms / 2 {
                Some(state.physical + self.save_interval_ms)
            } else {
                None
            }
        };

        if let Some(saved) = pending_save {
            self.persist(saved).await?;
            let mut state = self.state.lock().expect("tso lock poisoned");
            if saved > state.saved {
                state.saved = saved;
            }
        }
        Ok(())
    }

    /// Issue a batch of `count` strictly increasing timestamps.
    pub fn timestamps(&self, count: u32) -> ClusterResult<Vec<Timestamp>> {
        if count == 0 {
            return Err(ClusterError::InvalidRequest(
                "timestamp batch must be non-empty".to_string(),
            ));
        }

        let mut state = self.state.lock().expect("tso lock poisoned");
        if state.physical == 0 {
            // Not yet synced.
            return Err(ClusterError::TsoUnavailable);
        }
        if state.physical > state.saved {
            // The clock ran past the persisted bound; the next advance
            // restores headroom.
            return Err(ClusterError::TsoUnavailable);
        }

        let remaining = self.max_logical - state.logical;
        if count > remaining {
            return Err(ClusterError::TsoOverflow {
                requested: count,
                remaining,
            });
        }

        let physical = state.physical;
        let first = state.logical + 1;
        state.logical += count;
        drop(state);

        metrics::TIMESTAMPS_ISSUED.inc_by(count as u64);
        Ok((first..first + count)
            .map(|logical| Timestamp::new(physical, logical))
            .collect())
    }
}
