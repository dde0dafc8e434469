//! The meta-store trait and its wire-level data types.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::txn::{Txn, TxnOutcome};

/// Result type for meta-store operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Identifier of a granted lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(pub u64);

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key-value pair with its revisions.
///
/// `create_revision` is the store revision at which the key was created;
/// a compare against `create_revision == 0` expresses "the key must not
/// exist", which is how the leader key is claimed atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
    pub create_revision: i64,
    pub mod_revision: i64,
}

/// Event delivered on a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The key was written.
    Put { key: String, value: Bytes },
    /// The key was deleted explicitly.
    Delete { key: String },
    /// The key vanished because its lease expired.
    Expire { key: String },
}

impl WatchEvent {
    /// Whether this event means the watched key is gone.
    pub fn is_removal(&self) -> bool {
        matches!(self, WatchEvent::Delete { .. } | WatchEvent::Expire { .. })
    }
}

/// Stream of watch events for one key.
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Stream of keep-alive acknowledgements for one lease.
///
/// The stream ending means the lease is no longer being kept alive:
/// revoked, expired, or the backend became unreachable. Consumers must
/// treat stream end as loss of whatever the lease protected.
pub type KeepAliveStream = mpsc::Receiver<()>;

/// Errors surfaced by meta-store backends.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The backend is shut down or unreachable.
    #[error("meta store unavailable: {0}")]
    Unavailable(String),

    /// A lease operation referenced an unknown or expired lease.
    #[error("lease {0} not found")]
    LeaseNotFound(u64),

    /// The operation did not complete within the request timeout.
    #[error("meta store request timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value could not be decoded.
    #[error("corrupt meta record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Contract required from the external consensus KV store.
///
/// Semantics mirror the usual etcd-style primitives:
///
/// - `get` / `get_prefix` return values with create/mod revisions.
/// - `txn` evaluates all comparisons atomically and applies the `then`
///   operations only if every comparison holds.
/// - `lease_grant` creates a time-bounded lease; keys put with the lease
///   vanish when it expires. `lease_keep_alive` yields a stream of acks
///   whose end signals lease loss.
/// - `watch` yields put/delete/expire events for one key from the moment
///   of registration.
#[async_trait]
pub trait MetaStore: Send + Sync + 'static {
    /// Point read. `None` when the key is absent.
    async fn get(&self, key: &str) -> MetaResult<Option<KeyValue>>;

    /// Read every key with the given prefix, in lexicographic order.
    async fn get_prefix(&self, prefix: &str) -> MetaResult<Vec<KeyValue>>;

    /// Atomically evaluate comparisons and apply operations.
    async fn txn(&self, txn: Txn) -> MetaResult<TxnOutcome>;

    /// Grant a lease with the given time-to-live.
    async fn lease_grant(&self, ttl: Duration) -> MetaResult<LeaseId>;

    /// Keep a lease alive; the returned stream ends when the lease dies.
    async fn lease_keep_alive(&self, lease: LeaseId) -> MetaResult<KeepAliveStream>;

    /// Revoke a lease, deleting any keys attached to it.
    async fn lease_revoke(&self, lease: LeaseId) -> MetaResult<()>;

    /// Watch a single key for changes.
    async fn watch(&self, key: &str) -> MetaResult<WatchStream>;
}
