//! Prometheus metrics for the placement driver.
//!
//! Covers connection management, request processing, leadership, and the
//! issuance counters for the timestamp oracle and ID allocator.
//!
//! # Safety
//!
//! All metrics register against a custom registry with the "placekeeper"
//! prefix to avoid name collisions with other libraries using the default
//! Prometheus registry. Registration errors fall back to unregistered
//! no-op metrics instead of panicking.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder, opts,
};
use tracing::warn;

/// Custom Prometheus registry for placement-driver metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("placekeeper".to_string()), None).unwrap_or_else(|_| Registry::new())
});

fn register_int_gauge_safe(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::with_opts(opts!(name, help)).expect("valid gauge opts");
    if let Err(e) = registry.register(Box::new(gauge.clone())) {
        warn!(metric = name, error = %e, "failed to register metric");
    }
    gauge
}

fn register_int_counter_safe(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(opts!(name, help)).expect("valid counter opts");
    if let Err(e) = registry.register(Box::new(counter.clone())) {
        warn!(metric = name, error = %e, "failed to register metric");
    }
    counter
}

fn register_int_counter_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntCounterVec {
    let counter = IntCounterVec::new(opts!(name, help), labels).expect("valid counter opts");
    if let Err(e) = registry.register(Box::new(counter.clone())) {
        warn!(metric = name, error = %e, "failed to register metric");
    }
    counter
}

fn register_histogram_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> HistogramVec {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
        .expect("valid histogram opts");
    if let Err(e) = registry.register(Box::new(histogram.clone())) {
        warn!(metric = name, error = %e, "failed to register metric");
    }
    histogram
}

/// Currently open client connections.
pub static ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge_safe(
        &REGISTRY,
        "active_connections",
        "Number of currently open client connections",
    )
});

/// Connections accepted since startup.
pub static TOTAL_CONNECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "connections_total",
        "Client connections accepted since startup",
    )
});

/// Whether this replica currently holds leadership (0/1).
pub static IS_LEADER: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge_safe(
        &REGISTRY,
        "is_leader",
        "Whether this replica currently holds cluster leadership",
    )
});

/// Leadership acquisitions since startup.
pub static LEADER_TERMS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "leader_terms_total",
        "Number of times this replica acquired leadership",
    )
});

/// Requests processed, by command and outcome.
pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "requests_total",
        "Requests processed, labelled by command and outcome",
        &["command", "status"],
    )
});

/// Request handling latency in seconds, by command.
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec_safe(
        &REGISTRY,
        "request_duration_seconds",
        "Request handling latency in seconds, labelled by command",
        &["command"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
    )
});

/// Timestamps issued by the oracle.
pub static TIMESTAMPS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "timestamps_issued_total",
        "Timestamps issued by the oracle",
    )
});

/// IDs handed out by the allocator.
pub static IDS_ALLOCATED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "ids_allocated_total",
        "Unique IDs handed out by the allocator",
    )
});

/// Record one processed request.
pub fn record_request(command: &str, status: &str, duration_secs: f64) {
    REQUESTS.with_label_values(&[command, status]).inc();
    REQUEST_DURATION
        .with_label_values(&[command])
        .observe(duration_secs);
}

/// Render all metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
