//! # Placekeeper
//! Control-plane core of a placement driver for distributed key-value
//! stores.
//!
//! A small cluster of placekeeper replicas shares one strongly-consistent
//! meta store; exactly one replica at a time is the active leader and
//! services all requests. The leader:
//!
//! - issues strictly monotonic hybrid timestamps (the TSO), durable
//!   across failover
//! - allocates unique 64-bit IDs, batched, never reused
//! - holds the authoritative set of stores and the partitioning of the
//!   key space into regions
//! - arbitrates region lifecycle events (splits and replica changes)
//! - bootstraps a fresh cluster exactly once
//!
//! Consensus is delegated: the meta store is reached only through the
//! [`meta::MetaStore`] facade (get, guarded transactions, leases,
//! watches), and leadership is a lease-attached key claimed with a
//! compare-and-swap. Every persistent mutation is fenced on that key, so
//! a deposed leader cannot corrupt shared state.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/), [Nom](https://docs.rs/nom/latest/nom/)
//! - Correctness under failover first; see the invariants on
//!   [`cluster::tso`] and [`cluster::alloc`]
//!
//! ## Getting started
//!
//! Run a single-node instance over the in-memory meta store:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use placekeeper::cluster::Config;
//! use placekeeper::meta::MemStore;
//! use placekeeper::server::PlacementNode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = PlacementNode::start(Config::default(), Arc::new(MemStore::new())).await?;
//!     println!("placement driver on {}", node.addr());
//!     tokio::signal::ctrl_c().await?;
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Embedders pointing at a real consensus store implement
//! [`meta::MetaStore`] for it and hand that to
//! [`server::PlacementNode::start`].

#![forbid(unsafe_code)]

pub mod constants;
pub mod encode;
pub mod error;
pub mod model;
mod parser;
pub mod protocol;
pub mod types;

pub mod cluster;
pub mod meta;
pub mod runtime;
pub mod server;
pub mod telemetry;

pub mod prelude {
    //! Main exports for building against the placement driver.
    pub use crate::cluster::{ClusterError, ClusterResult, Config, ControlCore, ControlHandler};
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::meta::{MemStore, MetaStore};
    pub use crate::model::{ClusterMeta, Peer, Region, Store, StoreState};
    pub use crate::types::{PeerId, RegionId, StoreId, Timestamp};

    pub use bytes;

    pub mod server {
        //! Server-side entry points.
        pub use crate::server::*;
    }
}
