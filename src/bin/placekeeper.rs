//! Single-node placement-driver server.
//!
//! Runs one replica over the embedded in-memory meta store. Useful for
//! development and integration testing of store and client code; a
//! production deployment runs several replicas against a shared
//! consensus store via a networked `MetaStore` implementation.
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin placekeeper
//! ```
//!
//! With JSON logging and a custom address:
//!
//! ```bash
//! LOG_FORMAT=json PD_LISTEN_ADDR=0.0.0.0:2379 cargo run --bin placekeeper
//! ```
//!
//! ## Runtime configuration
//!
//! The server uses separate tokio runtimes for the control plane
//! (election, lease keep-alive, oracle tick) and the data plane (client
//! connections), so connection floods cannot starve the keep-alive.
//!
//! - `CONTROL_PLANE_THREADS`: control plane threads (default: 2)
//! - `DATA_PLANE_THREADS`: data plane threads (default: num_cpus)
//!
//! See `Config::from_env` for the `PD_*` variables.

use std::sync::Arc;

use placekeeper::cluster::Config;
use placekeeper::meta::MemStore;
use placekeeper::runtime::{NodeRuntimes, RuntimeConfig};
use placekeeper::server::PlacementNode;
use placekeeper::telemetry::{LogFormat, init_logging};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LogFormat::from_env())?;

    let config = Config::from_env();
    config.validate().map_err(|e| format!("invalid config: {e}"))?;

    let runtimes = NodeRuntimes::new(RuntimeConfig::from_env())?;
    let data_runtime = runtimes.data_handle();

    runtimes.block_on_control(async move {
        if !config.kv_endpoints.is_empty() {
            warn!(
                endpoints = ?config.kv_endpoints,
                "kv_endpoints configured, but this binary runs the embedded \
                 in-memory meta store; provide a networked MetaStore \
                 implementation to join a shared consensus store"
            );
        }

        let store = Arc::new(MemStore::new());
        let node = PlacementNode::start_with_runtime(config, store, data_runtime).await?;
        info!(addr = %node.addr(), "placement driver running");

        tokio::signal::ctrl_c().await?;
        info!("interrupt received, shutting down");
        node.shutdown().await;
        Ok(())
    })
}
