//! Timeout-wrapping client over a [`MetaStore`] backend.
//!
//! Every call into the external store is bounded by the configured request
//! timeout so a stalled backend cannot wedge the leader loop or a request
//! handler; the deadline expiring surfaces as [`MetaError::Timeout`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::store::{
    KeepAliveStream, KeyValue, LeaseId, MetaError, MetaResult, MetaStore, WatchStream,
};
use super::txn::{Txn, TxnOutcome};

/// Shared, timeout-enforcing handle to the meta store.
#[derive(Clone)]
pub struct MetaClient {
    store: Arc<dyn MetaStore>,
    request_timeout: Duration,
}

impl MetaClient {
    /// Wrap a backend with the given per-request timeout.
    pub fn new(store: Arc<dyn MetaStore>, request_timeout: Duration) -> Self {
        Self {
            store,
            request_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = MetaResult<T>>,
    ) -> MetaResult<T> {
        match timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MetaError::Timeout(self.request_timeout)),
        }
    }

    /// Point read with timeout.
    pub async fn get(&self, key: &str) -> MetaResult<Option<KeyValue>> {
        self.bounded(self.store.get(key)).await
    }

    /// Prefix scan with timeout.
    pub async fn get_prefix(&self, prefix: &str) -> MetaResult<Vec<KeyValue>> {
        self.bounded(self.store.get_prefix(prefix)).await
    }

    /// Guarded transaction with timeout.
    pub async fn txn(&self, txn: Txn) -> MetaResult<TxnOutcome> {
        self.bounded(self.store.txn(txn)).await
    }

    /// Lease grant with timeout.
    pub async fn lease_grant(&self, ttl: Duration) -> MetaResult<LeaseId> {
        self.bounded(self.store.lease_grant(ttl)).await
    }

    /// Open a keep-alive stream. Only the stream setup is bounded; the
    /// stream itself lives as long as the lease.
    pub async fn lease_keep_alive(&self, lease: LeaseId) -> MetaResult<KeepAliveStream> {
        self.bounded(self.store.lease_keep_alive(lease)).await
    }

    /// Lease revoke with timeout.
    pub async fn lease_revoke(&self, lease: LeaseId) -> MetaResult<()> {
        self.bounded(self.store.lease_revoke(lease)).await
    }

    /// Open a watch stream. Only the registration is bounded.
    pub async fn watch(&self, key: &str) -> MetaResult<WatchStream> {
        self.bounded(self.store.watch(key)).await
    }
}
