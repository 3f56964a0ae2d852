//! Prometheus metrics for the optimizer.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup. The helper functions
//! (`record_stage_latency`, `inc_request`, …) are no-ops if `init_metrics`
//! was never called, so engines and stores can be used without it.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `optimizer_requests_total` | Counter | `outcome` (`hit` / `miss`) |
//! | `optimizer_errors_total` | Counter | `kind` |
//! | `optimizer_stage_duration_seconds` | Histogram | `stage` |
//! | `optimizer_consensus_entries` | Gauge | — |
//! | `optimizer_consensus_updates_total` | Counter | — |

use crate::OptimizerError;
use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the optimizer, bundled together so they can
/// be stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Optimize requests by cache outcome.
    pub requests_total: CounterVec,
    /// Optimize failures by error kind.
    pub errors_total: CounterVec,
    /// Stage processing latency histogram.
    pub stage_duration: HistogramVec,
    /// Current number of consensus entries.
    pub consensus_entries: IntGauge,
    /// Consensus updates applied.
    pub consensus_updates: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn init_err(e: prometheus::Error) -> OptimizerError {
    OptimizerError::Other(format!("metrics init failed: {e}"))
}

fn register_err(e: prometheus::Error) -> OptimizerError {
    OptimizerError::Other(format!("metrics registration failed: {e}"))
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`OptimizerError::Other`] if metric construction or registry
/// registration fails (e.g., duplicate descriptor names).
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), OptimizerError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = CounterVec::new(
        Opts::new("optimizer_requests_total", "Optimize requests by cache outcome"),
        &["outcome"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(requests_total.clone()))
        .map_err(register_err)?;

    let errors_total = CounterVec::new(
        Opts::new("optimizer_errors_total", "Optimize failures by error kind"),
        &["kind"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(errors_total.clone()))
        .map_err(register_err)?;

    let stage_duration = HistogramVec::new(
        HistogramOpts::new(
            "optimizer_stage_duration_seconds",
            "Processing duration per pipeline stage",
        ),
        &["stage"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(stage_duration.clone()))
        .map_err(register_err)?;

    let consensus_entries = IntGauge::new(
        "optimizer_consensus_entries",
        "Entries currently held by the consensus store",
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(consensus_entries.clone()))
        .map_err(register_err)?;

    let consensus_updates = IntCounter::new(
        "optimizer_consensus_updates_total",
        "Consensus updates applied",
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(consensus_updates.clone()))
        .map_err(register_err)?;

    // A racing initializer may have won; its descriptors are identical.
    let _ = METRICS.set(Metrics {
        registry,
        requests_total,
        errors_total,
        stage_duration,
        consensus_entries,
        consensus_updates,
    });

    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Record the processing latency for a pipeline stage.
///
/// No-op if metrics have not been initialised.
pub fn record_stage_latency(stage: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.stage_duration.get_metric_with_label_values(&[stage]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Increment the optimize request counter for a cache outcome (`hit` / `miss`).
///
/// No-op if metrics have not been initialised.
pub fn inc_request(outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.requests_total.get_metric_with_label_values(&[outcome]) {
            c.inc();
        }
    }
}

/// Increment the error counter for an error kind.
///
/// No-op if metrics have not been initialised.
pub fn inc_error(kind: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.errors_total.get_metric_with_label_values(&[kind]) {
            c.inc();
        }
    }
}

/// Set the consensus entry gauge.
///
/// No-op if metrics have not been initialised.
pub fn set_consensus_entries(entries: usize) {
    if let Some(m) = metrics() {
        m.consensus_entries
            .set(i64::try_from(entries).unwrap_or(i64::MAX));
    }
}

/// Count one applied consensus update.
///
/// No-op if metrics have not been initialised.
pub fn inc_consensus_update() {
    if let Some(m) = metrics() {
        m.consensus_updates.inc();
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// A structured snapshot of the counter values.
#[derive(Debug, Default)]
pub struct MetricsSummary {
    /// Optimize request counts keyed by cache outcome.
    pub requests_total: HashMap<String, u64>,
    /// Error counts keyed by error kind.
    pub errors_total: HashMap<String, u64>,
    /// Consensus updates applied.
    pub consensus_updates: u64,
}

fn collect_by_label(vec: &CounterVec, label: &str) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    for family in vec.collect() {
        for metric in family.get_metric() {
            let key = metric
                .get_label()
                .iter()
                .find(|l| l.get_name() == label)
                .map_or("unknown", |l| l.get_value());
            out.insert(key.to_string(), metric.get_counter().get_value() as u64);
        }
    }
    out
}

/// Return a structured summary of current metric counter values.
///
/// Returns a zeroed [`MetricsSummary`] if metrics have not been initialised.
pub fn get_metrics_summary() -> MetricsSummary {
    let Some(m) = metrics() else {
        return MetricsSummary::default();
    };

    MetricsSummary {
        requests_total: collect_by_label(&m.requests_total, "outcome"),
        errors_total: collect_by_label(&m.errors_total, "kind"),
        consensus_updates: m.consensus_updates.get(),
    }
}
