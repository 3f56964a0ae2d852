//! # Stage: Declarative Optimizer Configuration
//!
//! ## Responsibility
//! Parse and validate TOML optimizer configuration files. An engine, its
//! transform, and the consensus store it shares can all be described in one
//! file and started with:
//! ```text
//! interface-optimizer --config optimizer.toml
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `OptimizerConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Complete defaults: an empty file is a valid configuration
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building the engine from config (that belongs to `engine`)
//! - Metrics collection (that belongs to `metrics`)

pub mod loader;
pub mod validation;

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusConfig;
use crate::transform::TransformConfig;
use crate::OptimizerError;

// ── Default value functions ──────────────────────────────────────────────

/// Default bandwidth: 10 Gbps (scale factor 1.0).
pub(crate) fn default_bandwidth_gbps() -> f64 {
    10.0
}

/// Default latency: 10 ms (scale factor 1.0).
pub(crate) fn default_latency_ms() -> f64 {
    10.0
}

/// Default register width: 64 qubits.
pub(crate) fn default_qubit_capacity() -> usize {
    64
}

/// Default entanglement rounds per shot.
pub(crate) fn default_entanglement_depth() -> u32 {
    3
}

/// Default shots per sample.
pub(crate) fn default_shots() -> u32 {
    1000
}

/// Default per-bit flip probability per round.
///
/// At 64 qubits and depth 3 about 15% of shots stay noise-free.
pub(crate) fn default_mixing_rate() -> f64 {
    0.01
}

/// Default sampler seed.
pub(crate) fn default_seed() -> u64 {
    0x5EED
}

/// Default nominal clock speed, informational only.
pub(crate) fn default_clock_speed_ghz() -> f64 {
    2.5
}

/// Default consensus protocol version label.
pub(crate) fn default_consensus_version() -> String {
    "1.0".to_string()
}

/// Default number of entries that earns a contribution score of 1.0.
pub(crate) fn default_contribution_baseline() -> f64 {
    100.0
}

/// Default staleness horizon, in consensus updates.
pub(crate) fn default_stale_after_updates() -> u64 {
    100
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for an optimizer instance.
///
/// Every section and field has a documented default.
///
/// # Example
///
/// ```toml
/// [network]
/// bandwidth_gbps = 20.0
/// latency_ms = 5.0
///
/// [transform]
/// qubit_capacity = 128
/// entanglement_depth = 4
///
/// [consensus]
/// stale_after_updates = 50
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Initial network conditions.
    pub network: NetworkSection,
    /// Stochastic transform parameters.
    pub transform: TransformConfig,
    /// Consensus store policy.
    pub consensus: ConsensusConfig,
    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Initial network conditions for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NetworkSection {
    /// Bandwidth in Gbps. Must be > 0.
    #[serde(default = "default_bandwidth_gbps")]
    pub bandwidth_gbps: f64,
    /// Latency in milliseconds. Must be > 0.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: f64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bandwidth_gbps: default_bandwidth_gbps(),
            latency_ms: default_latency_ms(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Observability configuration: logging and metrics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format. `LOG_FORMAT` in the environment takes precedence.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Whether to initialise the Prometheus registry at startup.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            metrics_enabled: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable log output.
    #[default]
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

impl LogFormat {
    /// Value understood by `LOG_FORMAT`.
    pub fn as_env_value(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Load the configuration at `path`, or the defaults when no path is given.
///
/// # Errors
///
/// Returns [`OptimizerError::Config`] wrapping any loader or validation failure.
pub fn load_or_default(path: Option<&Path>) -> Result<OptimizerConfig, OptimizerError> {
    match path {
        Some(path) => Ok(loader::load_from_file(path)?),
        None => Ok(OptimizerConfig::default()),
    }
}

/// Export the JSON Schema for `OptimizerConfig`.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(OptimizerConfig);
    serde_json::to_string_pretty(&schema)
}
