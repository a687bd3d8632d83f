// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the pool manager.
//!
//! All metrics use the `zonepool_` prefix.
//!
//! # Metrics Categories
//!
//! - **Cycle Metrics** - propagation cycles, their outcome and duration
//! - **Poll Metrics** - individual SOA polls by result
//! - **Backend Metrics** - control calls per driver and operation
//! - **Authority Metrics** - status callbacks, applied or suppressed
//! - **Recovery Metrics** - domains re-driven by the periodic sweeps
//!
//! # Example
//!
//! ```rust,no_run
//! use zonepool::metrics::{gather_metrics, record_poll};
//!
//! record_poll("converged");
//! let text = gather_metrics().unwrap();
//! assert!(text.contains("zonepool_polls_total"));
//! ```

use crate::model::{ReportedStatus, ZoneAction};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "zonepool";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Completed propagation cycles
///
/// Labels:
/// - `action`: `CREATE`, `UPDATE`, `DELETE`
/// - `outcome`: `converged`, `failed`, `abandoned`
pub static CYCLES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cycles_total"),
        "Total number of propagation cycles by action and outcome",
    );
    let counter = CounterVec::new(opts, &["action", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of propagation cycles in seconds
///
/// Labels:
/// - `action`: `CREATE`, `UPDATE`, `DELETE`
pub static CYCLE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_cycle_duration_seconds"),
        "Duration of propagation cycles in seconds by action",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 150.0, 300.0, 600.0]);
    let histogram = HistogramVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Cycles currently running
pub static CYCLES_IN_FLIGHT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_cycles_in_flight"),
        "Number of propagation cycles currently running",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Poll Metrics
// ============================================================================

/// SOA polls by result
///
/// Labels:
/// - `result`: `converged`, `behind`, `absent`, `timeout`, `bad_response`
pub static POLLS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_polls_total"),
        "Total number of SOA polls by result",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Convergence cache writes that hit a version conflict
pub static CACHE_CONFLICTS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_cache_conflicts_total"),
        "Total number of convergence cache version conflicts",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Backend Metrics
// ============================================================================

/// Backend control calls
///
/// Labels:
/// - `backend`: driver type (`bind9`, `agent`, `fake`)
/// - `operation`: `CREATE`, `UPDATE`, `DELETE`
/// - `result`: `success` or the error reason code
pub static BACKEND_CALLS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_backend_calls_total"),
        "Total number of backend control calls by driver, operation and result",
    );
    let counter = CounterVec::new(opts, &["backend", "operation", "result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Authority Metrics
// ============================================================================

/// Status callbacks received by the authority
///
/// Labels:
/// - `status`: `SUCCESS`, `ERROR`
/// - `applied`: `true` when the domain changed, `false` when suppressed
pub static STATUS_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_status_updates_total"),
        "Total number of status callbacks by status and whether they were applied",
    );
    let counter = CounterVec::new(opts, &["status", "applied"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Recovery Metrics
// ============================================================================

/// Domains re-driven by background sweeps
///
/// Labels:
/// - `kind`: `recovery` (stale PENDING) or `sync` (full re-poll)
pub static RECOVERY_DOMAINS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_recovery_domains_total"),
        "Total number of domains re-polled by background sweeps",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a finished cycle.
pub fn record_cycle(action: ZoneAction, outcome: &str, duration: Duration) {
    CYCLES_TOTAL
        .with_label_values(&[action.as_str(), outcome])
        .inc();
    CYCLE_DURATION_SECONDS
        .with_label_values(&[action.as_str()])
        .observe(duration.as_secs_f64());
}

/// A cycle started running.
pub fn cycle_started() {
    CYCLES_IN_FLIGHT.inc();
}

/// A cycle stopped running.
pub fn cycle_finished() {
    CYCLES_IN_FLIGHT.dec();
}

/// Record one SOA poll.
pub fn record_poll(result: &str) {
    POLLS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a convergence cache conflict.
pub fn record_cache_conflict() {
    CACHE_CONFLICTS_TOTAL.inc();
}

/// Record a backend control call.
pub fn record_backend_call(backend: &str, action: ZoneAction, result: &str) {
    BACKEND_CALLS_TOTAL
        .with_label_values(&[backend, action.as_str(), result])
        .inc();
}

/// Record a status callback.
pub fn record_status_update(status: ReportedStatus, applied: bool) {
    STATUS_UPDATES_TOTAL
        .with_label_values(&[status.as_str(), if applied { "true" } else { "false" }])
        .inc();
}

/// Record domains picked up by a background sweep.
pub fn record_recovery(kind: &str, count: usize) {
    #[allow(clippy::cast_precision_loss)]
    RECOVERY_DOMAINS_TOTAL
        .with_label_values(&[kind])
        .inc_by(count as f64);
}

/// Gather all metrics in Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
