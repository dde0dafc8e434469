//! Runtime separation for control plane and data plane.
//!
//! This module provides separate tokio runtimes for:
//! - **Control plane**: leader election, lease keep-alive, the timestamp
//!   oracle tick
//! - **Data plane**: client connections and request dispatch
//!
//! Separating these prevents a flood of client connections from starving
//! the lease keep-alive, which would read as a dead leader and trigger an
//! unnecessary election.
//!
//! # Example
//!
//! ```rust,no_run
//! use placekeeper::runtime::{NodeRuntimes, RuntimeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RuntimeConfig::default();
//!     let runtimes = NodeRuntimes::new(config)?;
//!
//!     runtimes.block_on_control(async {
//!         // ... assemble and run the node with runtimes.data_handle()
//!     });
//!
//!     Ok(())
//! }
//! ```

use std::io;
use tokio::runtime::{Builder, Handle, Runtime};

/// Configuration for the dual-runtime setup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads for the control plane.
    ///
    /// Election, keep-alive, and the oracle tick are low-throughput but
    /// latency-sensitive.
    ///
    /// Default: 2
    pub control_plane_threads: usize,

    /// Number of worker threads for the data plane.
    ///
    /// Client connections are high-throughput I/O-heavy tasks.
    ///
    /// Default: number of CPU cores
    pub data_plane_threads: usize,

    /// Thread name prefix for control plane threads.
    ///
    /// Default: "ctrl"
    pub control_plane_thread_name: String,

    /// Thread name prefix for data plane threads.
    ///
    /// Default: "data"
    pub data_plane_thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control_plane_threads: 2,
            data_plane_threads: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
            control_plane_thread_name: "ctrl".to_string(),
            data_plane_thread_name: "data".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// - `CONTROL_PLANE_THREADS`: control plane worker threads (default: 2)
    /// - `DATA_PLANE_THREADS`: data plane worker threads (default: num_cpus)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let control_plane_threads = std::env::var("CONTROL_PLANE_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.control_plane_threads);

        let data_plane_threads = std::env::var("DATA_PLANE_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.data_plane_threads);

        Self {
            control_plane_threads,
            data_plane_threads,
            ..defaults
        }
    }
}

/// Separate tokio runtimes for control and data plane work.
pub struct NodeRuntimes {
    control: Runtime,
    data: Runtime,
}

impl NodeRuntimes {
    /// Build both runtimes from the given configuration.
    pub fn new(config: RuntimeConfig) -> io::Result<Self> {
        let control = Builder::new_multi_thread()
            .worker_threads(config.control_plane_threads)
            .thread_name(config.control_plane_thread_name)
            .enable_all()
            .build()?;

        let data = Builder::new_multi_thread()
            .worker_threads(config.data_plane_threads)
            .thread_name(config.data_plane_thread_name)
            .enable_all()
            .build()?;

        Ok(Self { control, data })
    }

    /// Handle for spawning onto the control plane runtime.
    pub fn control_handle(&self) -> Handle {
        self.control.handle().clone()
    }

    /// Handle for spawning onto the data plane runtime.
    pub fn data_handle(&self) -> Handle {
        self.data.handle().clone()
    }

    /// Block the current thread on a control plane future.
    pub fn block_on_control<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.control.block_on(fut)
    }
}
