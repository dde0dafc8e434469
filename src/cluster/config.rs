//! Placement-driver configuration.
//!
//! One flat struct with validated defaults. The process embedding the
//! driver (or the bundled binary) decides where values come from; helpers
//! for environment-variable loading are provided.

use std::time::Duration;

use crate::constants::{
    DEFAULT_ALLOC_STEP, DEFAULT_LEADER_LEASE_SECS, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TSO_MAX_LOGICAL, DEFAULT_TSO_SAVE_INTERVAL_MS,
    DEFAULT_TSO_UPDATE_STEP_MS,
};

/// Configuration for one placement-driver replica.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address the wire listener binds.
    pub listen_addr: String,

    /// Address advertised in the leader record; defaults to `listen_addr`.
    pub advertise_addr: Option<String>,

    /// Key prefix under which all state lives in the meta store.
    pub root_path: String,

    /// Endpoints of the external meta store, for networked backends.
    /// Unused by the in-memory backend.
    pub kv_endpoints: Vec<String>,

    /// Cluster identifier echoed in response headers and stored in the
    /// cluster config record at bootstrap.
    pub cluster_id: u64,

    /// Leader lease duration in seconds.
    pub leader_lease_secs: u64,

    /// Interval between timestamp checkpoint writes, in milliseconds.
    pub tso_save_interval_ms: u64,

    /// Timestamp-oracle advance tick, in milliseconds.
    pub tso_update_step_ms: u64,

    /// Maximum logical counter within one physical millisecond.
    pub tso_max_logical: u32,

    /// IDs reserved per allocator window.
    pub alloc_step: u64,

    /// Timeout applied to every meta-store call, in milliseconds.
    pub request_timeout_ms: u64,

    /// Maximum frame payload accepted from a client.
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:2379".to_string(),
            advertise_addr: None,
            root_path: "/pd".to_string(),
            kv_endpoints: Vec::new(),
            cluster_id: 0,
            leader_lease_secs: DEFAULT_LEADER_LEASE_SECS,
            tso_save_interval_ms: DEFAULT_TSO_SAVE_INTERVAL_MS,
            tso_update_step_ms: DEFAULT_TSO_UPDATE_STEP_MS,
            tso_max_logical: DEFAULT_TSO_MAX_LOGICAL,
            alloc_step: DEFAULT_ALLOC_STEP,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults field by field.
    ///
    /// - `PD_LISTEN_ADDR`, `PD_ADVERTISE_ADDR`, `PD_ROOT_PATH`
    /// - `PD_KV_ENDPOINTS` (comma-separated), `PD_CLUSTER_ID`
    /// - `PD_LEADER_LEASE_SECS`, `PD_TSO_SAVE_INTERVAL_MS`,
    ///   `PD_TSO_UPDATE_STEP_MS`, `PD_ALLOC_STEP`, `PD_REQUEST_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("PD_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            advertise_addr: std::env::var("PD_ADVERTISE_ADDR").ok(),
            root_path: std::env::var("PD_ROOT_PATH").unwrap_or(defaults.root_path),
            kv_endpoints: std::env::var("PD_KV_ENDPOINTS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            cluster_id: env_parse("PD_CLUSTER_ID", defaults.cluster_id),
            leader_lease_secs: env_parse("PD_LEADER_LEASE_SECS", defaults.leader_lease_secs),
            tso_save_interval_ms: env_parse("PD_TSO_SAVE_INTERVAL_MS", defaults.tso_save_interval_ms),
            tso_update_step_ms: env_parse("PD_TSO_UPDATE_STEP_MS", defaults.tso_update_step_ms),
            tso_max_logical: defaults.tso_max_logical,
            alloc_step: env_parse("PD_ALLOC_STEP", defaults.alloc_step),
            request_timeout_ms: env_parse("PD_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            max_frame_size: defaults.max_frame_size,
        }
    }

    /// Check invariants between fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.root_path.is_empty() || !self.root_path.starts_with('/') {
            return Err("root_path must be a non-empty absolute path".to_string());
        }
        if self.leader_lease_secs == 0 {
            return Err("leader_lease_secs must be positive".to_string());
        }
        if self.tso_update_step_ms == 0 {
            return Err("tso_update_step_ms must be positive".to_string());
        }
        if self.tso_save_interval_ms < 2 * self.tso_update_step_ms {
            return Err(format!(
                "tso_save_interval_ms ({}) must be at least twice tso_update_step_ms ({})",
                self.tso_save_interval_ms, self.tso_update_step_ms
            ));
        }
        if self.alloc_step == 0 {
            return Err("alloc_step must be positive".to_string());
        }
        if self.tso_max_logical == 0 {
            return Err("tso_max_logical must be positive".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be positive".to_string());
        }
        Ok(())
    }

    /// Address written into the leader record.
    pub fn advertised(&self) -> &str {
        self.advertise_addr.as_deref().unwrap_or(&self.listen_addr)
    }

    /// Leader lease duration.
    pub fn leader_lease(&self) -> Duration {
        Duration::from_secs(self.leader_lease_secs)
    }

    /// Timestamp checkpoint interval.
    pub fn tso_save_interval(&self) -> Duration {
        Duration::from_millis(self.tso_save_interval_ms)
    }

    /// Timestamp advance tick interval.
    pub fn tso_update_step(&self) -> Duration {
        Duration::from_millis(self.tso_update_step_ms)
    }

    /// Meta-store request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
