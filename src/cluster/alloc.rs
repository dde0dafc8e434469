//! The unique-ID allocator.
//!
//! Hands out strictly increasing 64-bit IDs, batched for throughput. One
//! key in the meta store holds the upper bound of the last reserved
//! window; the in-memory window `[bound - step + 1, bound]` is consumed
//! under a mutex, and exhaustion triggers a compare-and-swap reservation
//! of the next window.
//!
//! The reservation is fenced on both the leader key and the current
//! stored bound, so windows are serialized across the cluster's lifetime:
//! a new leader re-reads the bound and reserves strictly above anything a
//! predecessor ever handed out. IDs left in a window when leadership
//! moves are never reused; the allocator accepts sparse allocation.

use std::sync::Arc;
use std::sync::Mutex;

use backon::BackoffBuilder;

use crate::constants::MAX_ALLOC_RESERVE_ATTEMPTS;
use crate::encode::{decode_u64, encode_u64};
use crate::meta::{Compare, MetaClient, Txn, TxnOp};

use super::error::{ClusterError, ClusterResult};
use super::metrics;
use super::retry;
use super::LeaderLock;

#[derive(Debug, Clone, Copy)]
struct Window {
    /// Next ID to hand out; the window is exhausted when `next > end`.
    next: u64,
    end: u64,
}

impl Window {
    const EMPTY: Window = Window { next: 1, end: 0 };
}

/// Batched, crash-safe ID allocator for one leadership term.
pub struct IdAllocator {
    meta: MetaClient,
    lock: Arc<LeaderLock>,
    key: String,
    step: u64,
    window: Mutex<Window>,
    /// Serializes window reservations so concurrent exhaustion does not
    /// burn a window per waiter.
    reserve_gate: tokio::sync::Mutex<()>,
}

impl IdAllocator {
    /// Build an allocator with an empty window; the first allocation
    /// reserves one.
    pub fn new(meta: MetaClient, lock: Arc<LeaderLock>, key: String, step: u64) -> Self {
        Self {
            meta,
            lock,
            key,
            step,
            window: Mutex::new(Window::EMPTY),
            reserve_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn take_one(&self) -> Option<u64> {
        let mut window = self.window.lock().expect("allocator lock poisoned");
        if window.next <= window.end {
            let id = window.next;
            window.next += 1;
            Some(id)
        } else {
            None
        }
    }

    /// Allocate one unique ID.
    pub async fn alloc(&self) -> ClusterResult<u64> {
        loop {
            if let Some(id) = self.take_one() {
                metrics::IDS_ALLOCATED.inc();
                return Ok(id);
            }

            let _gate = self.reserve_gate.lock().await;
            // Another waiter may have refilled while we queued.
            if let Some(id) = self.take_one() {
                metrics::IDS_ALLOCATED.inc();
                return Ok(id);
            }

            let window = self.reserve().await?;
            *self.window.lock().expect("allocator lock poisoned") = window;
        }
    }

    /// Reserve the next window via guarded compare-and-swap, with bounded
    /// retries for contention.
    async fn reserve(&self) -> ClusterResult<Window> {
        let mut backoff = retry::fast_policy()
            .with_max_times(MAX_ALLOC_RESERVE_ATTEMPTS - 1)
            .build();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let current = self.meta.get(&self.key).await?;
            let (cmp, base) = match &current {
                None => (Compare::absent(self.key.clone()), 0u64),
                Some(kv) => {
                    let base = decode_u64(&kv.value).ok_or_else(|| ClusterError::Corrupt {
                        key: self.key.clone(),
                        reason: "allocator bound shorter than 8 bytes".to_string(),
                    })?;
                    (Compare::value_eq(self.key.clone(), kv.value.clone()), base)
                }
            };

            let end = base + self.step;
            let txn = Txn::new()
                .when(self.lock.guard())
                .when(cmp)
                .then(TxnOp::put(self.key.clone(), encode_u64(end).to_vec()));

            if self.meta.txn(txn).await?.succeeded {
                tracing::debug!(base, end, "reserved id window");
                return Ok(Window {
                    next: base + 1,
                    end,
                });
            }

            // The transaction can fail on either comparison. Losing the
            // leader guard is terminal; losing the value comparison is
            // contention worth retrying.
            let leader = self.meta.get(self.lock.key()).await?;
            let still_ours = matches!(&leader, Some(kv) if kv.value == *self.lock.record());
            if !still_ours {
                return Err(ClusterError::LeadershipLost);
            }

            tracing::warn!(attempt = attempts, key = %self.key, "allocator reservation contended");
            match backoff.next() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(ClusterError::AllocExhausted { attempts }),
            }
        }
    }
}
