//! Facade over the external strongly-consistent meta store.
//!
//! The placement driver never embeds consensus. Everything durable —
//! the leader key, the timestamp checkpoint, the allocator bound, cluster
//! metadata — lives in an external store reached only through the
//! [`MetaStore`] trait: point gets, prefix scans, guarded transactions,
//! leases with keep-alive streams, and key watches.
//!
//! Backends are swappable behind the trait. The crate ships
//! [`MemStore`], a fully functional in-memory backend with revisions,
//! lease expiry, and watch delivery; it backs the test suites and the
//! bundled single-node binary. An etcd-like networked backend is an
//! embedder concern.

mod client;
mod memory;
mod store;
mod txn;

pub use client::MetaClient;
pub use memory::MemStore;
pub use store::{
    KeepAliveStream, KeyValue, LeaseId, MetaError, MetaResult, MetaStore, WatchEvent, WatchStream,
};
pub use txn::{Compare, Txn, TxnOp, TxnOutcome};
