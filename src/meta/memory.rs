//! In-memory meta-store backend.
//!
//! A fully functional implementation of [`MetaStore`] with revisions,
//! guarded transactions, expiring leases, and watch delivery. It backs the
//! test suites and the bundled single-node binary; multi-node deployments
//! provide a networked backend behind the same trait.
//!
//! Lease semantics match the external-store contract: a granted lease
//! carries a deadline, keys put with the lease vanish when it dies, and a
//! keep-alive stream extends the deadline while it is serviced. A
//! background sweeper expires overdue leases and delivers `Expire` events
//! to watchers.
//!
//! For failover tests, [`MemStore::partition`] freezes keep-alive
//! servicing without touching anything else, so leases run out exactly as
//! they would for a leader cut off from the store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::store::{
    KeepAliveStream, KeyValue, LeaseId, MetaError, MetaResult, MetaStore, WatchEvent, WatchStream,
};
use super::txn::{Compare, Txn, TxnOp, TxnOutcome};

/// How often the sweeper looks for expired leases.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    create_revision: i64,
    mod_revision: i64,
    lease: Option<u64>,
}

#[derive(Debug)]
struct Lease {
    ttl: Duration,
    deadline: Instant,
    keys: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    revision: i64,
    kv: BTreeMap<String, Entry>,
    leases: HashMap<u64, Lease>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<WatchEvent>>>,
    next_lease_id: u64,
}

impl Inner {
    fn notify(&mut self, key: &str, event: WatchEvent) {
        if let Some(senders) = self.watchers.get_mut(key) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            if senders.is_empty() {
                self.watchers.remove(key);
            }
        }
    }

    fn check(&self, cmp: &Compare) -> bool {
        match cmp {
            Compare::CreateRevision { key, revision } => match self.kv.get(key) {
                Some(entry) => entry.create_revision == *revision,
                None => *revision == 0,
            },
            Compare::Value { key, value } => {
                matches!(self.kv.get(key), Some(entry) if entry.value == *value)
            }
        }
    }

    fn apply_put(&mut self, key: String, value: Bytes, lease: Option<LeaseId>) {
        self.revision += 1;
        let create_revision = self
            .kv
            .get(&key)
            .map(|e| e.create_revision)
            .unwrap_or(self.revision);

        // Detach from a previous lease if the key moves to a new one.
        if let Some(old) = self.kv.get(&key).and_then(|e| e.lease) {
            if let Some(l) = self.leases.get_mut(&old) {
                l.keys.remove(&key);
            }
        }

        let lease_id = lease.map(|l| l.0);
        if let Some(id) = lease_id {
            if let Some(l) = self.leases.get_mut(&id) {
                l.keys.insert(key.clone());
            }
        }

        self.kv.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                create_revision,
                mod_revision: self.revision,
                lease: lease_id,
            },
        );
        self.notify(&key, WatchEvent::Put { key: key.clone(), value });
    }

    fn apply_delete(&mut self, key: &str) {
        if let Some(entry) = self.kv.remove(key) {
            self.revision += 1;
            if let Some(id) = entry.lease {
                if let Some(l) = self.leases.get_mut(&id) {
                    l.keys.remove(key);
                }
            }
            self.notify(key, WatchEvent::Delete { key: key.to_string() });
        }
    }

    fn expire_lease(&mut self, id: u64) {
        if let Some(lease) = self.leases.remove(&id) {
            for key in lease.keys {
                if self.kv.remove(&key).is_some() {
                    self.revision += 1;
                    self.notify(&key, WatchEvent::Expire { key: key.clone() });
                }
            }
        }
    }
}

/// In-memory [`MetaStore`] backend.
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
    partitioned: Arc<AtomicBool>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Create a store and start its lease sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let inner: Arc<Mutex<Inner>> = Arc::new(Mutex::new(Inner::default()));
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut guard = inner.lock().expect("meta store lock poisoned");
                let now = Instant::now();
                let expired: Vec<u64> = guard
                    .leases
                    .iter()
                    .filter(|(_, lease)| lease.deadline <= now)
                    .map(|(id, _)| *id)
                    .collect();
                for id in expired {
                    tracing::debug!(lease = id, "lease expired");
                    guard.expire_lease(id);
                }
            }
        });

        Self {
            inner,
            partitioned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate a network partition between lease holders and the store:
    /// keep-alive streams stop extending (and acking) leases until
    /// [`heal`](Self::heal) is called, so attached keys expire on schedule.
    pub fn partition(&self) {
        self.partitioned.store(true, Ordering::SeqCst);
    }

    /// Undo [`partition`](Self::partition).
    pub fn heal(&self) {
        self.partitioned.store(false, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("meta store lock poisoned")
    }
}

#[async_trait]
impl MetaStore for MemStore {
    async fn get(&self, key: &str) -> MetaResult<Option<KeyValue>> {
        let guard = self.lock();
        Ok(guard.kv.get(key).map(|entry| KeyValue {
            key: key.to_string(),
            value: entry.value.clone(),
            create_revision: entry.create_revision,
            mod_revision: entry.mod_revision,
        }))
    }

    async fn get_prefix(&self, prefix: &str) -> MetaResult<Vec<KeyValue>> {
        let guard = self.lock();
        Ok(guard
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, entry)| KeyValue {
                key: k.clone(),
                value: entry.value.clone(),
                create_revision: entry.create_revision,
                mod_revision: entry.mod_revision,
            })
            .collect())
    }

    async fn txn(&self, txn: Txn) -> MetaResult<TxnOutcome> {
        let mut guard = self.lock();

        if !txn.when.iter().all(|cmp| guard.check(cmp)) {
            return Ok(TxnOutcome { succeeded: false });
        }

        // Validate lease references before applying anything.
        for op in &txn.then {
            if let TxnOp::Put {
                lease: Some(lease), ..
            } = op
            {
                if !guard.leases.contains_key(&lease.0) {
                    return Err(MetaError::LeaseNotFound(lease.0));
                }
            }
        }

        for op in txn.then {
            match op {
                TxnOp::Put { key, value, lease } => guard.apply_put(key, value, lease),
                TxnOp::Delete { key } => guard.apply_delete(&key),
            }
        }

        Ok(TxnOutcome { succeeded: true })
    }

    async fn lease_grant(&self, ttl: Duration) -> MetaResult<LeaseId> {
        let mut guard = self.lock();
        guard.next_lease_id += 1;
        let id = guard.next_lease_id;
        guard.leases.insert(
            id,
            Lease {
                ttl,
                deadline: Instant::now() + ttl,
                keys: HashSet::new(),
            },
        );
        Ok(LeaseId(id))
    }

    async fn lease_keep_alive(&self, lease: LeaseId) -> MetaResult<KeepAliveStream> {
        let ttl = {
            let guard = self.lock();
            match guard.leases.get(&lease.0) {
                Some(l) => l.ttl,
                None => return Err(MetaError::LeaseNotFound(lease.0)),
            }
        };

        let (tx, rx) = mpsc::channel(4);
        let inner = Arc::downgrade(&self.inner);
        let partitioned = self.partitioned.clone();
        let renew_every = (ttl / 3).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(renew_every);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if partitioned.load(Ordering::SeqCst) {
                    // Acks stop and the deadline runs out, exactly as if
                    // the holder could not reach the store.
                    continue;
                }
                {
                    let mut guard = inner.lock().expect("meta store lock poisoned");
                    match guard.leases.get_mut(&lease.0) {
                        Some(l) => l.deadline = Instant::now() + l.ttl,
                        // Lease revoked or expired: end the stream.
                        None => return,
                    }
                }
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn lease_revoke(&self, lease: LeaseId) -> MetaResult<()> {
        let mut guard = self.lock();
        if !guard.leases.contains_key(&lease.0) {
            return Err(MetaError::LeaseNotFound(lease.0));
        }
        // Revocation deletes attached keys; watchers see explicit deletes.
        let keys: Vec<String> = guard
            .leases
            .get(&lease.0)
            .map(|l| l.keys.iter().cloned().collect())
            .unwrap_or_default();
        guard.leases.remove(&lease.0);
        for key in keys {
            guard.apply_delete(&key);
        }
        Ok(())
    }

    async fn watch(&self, key: &str) -> MetaResult<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.lock();
        guard.watchers.entry(key.to_string()).or_default().push(tx);
        Ok(rx)
    }
}
