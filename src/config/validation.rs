//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`OptimizerConfig`] that cannot
//! be expressed through the type system alone (range checks, finiteness).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::OptimizerConfig;
use crate::transform::{MAX_ENTANGLEMENT_DEPTH, MAX_QUBIT_CAPACITY, MAX_SHOTS};

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "network.latency_ms").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn positive_finite(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Validate all semantic constraints on an [`OptimizerConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Errors
///
/// Returns `Err(Vec<ConfigError>)` with every violation found.
pub fn validate(config: &OptimizerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Network ──────────────────────────────────────────────────────
    if !positive_finite(config.network.bandwidth_gbps) {
        errors.push(invalid(
            "network.bandwidth_gbps",
            config.network.bandwidth_gbps,
            "must be a positive number",
        ));
    }
    if !positive_finite(config.network.latency_ms) {
        errors.push(invalid(
            "network.latency_ms",
            config.network.latency_ms,
            "must be a positive number",
        ));
    }

    // ── Transform ────────────────────────────────────────────────────
    let transform = &config.transform;
    if transform.qubit_capacity == 0 || transform.qubit_capacity > MAX_QUBIT_CAPACITY {
        errors.push(invalid(
            "transform.qubit_capacity",
            transform.qubit_capacity,
            &format!("must be between 1 and {MAX_QUBIT_CAPACITY}"),
        ));
    }
    if transform.entanglement_depth > MAX_ENTANGLEMENT_DEPTH {
        errors.push(invalid(
            "transform.entanglement_depth",
            transform.entanglement_depth,
            &format!("must be at most {MAX_ENTANGLEMENT_DEPTH}"),
        ));
    }
    if transform.shots == 0 || transform.shots > MAX_SHOTS {
        errors.push(invalid(
            "transform.shots",
            transform.shots,
            &format!("must be between 1 and {MAX_SHOTS}"),
        ));
    }
    if !(0.0..=1.0).contains(&transform.mixing_rate) {
        errors.push(invalid(
            "transform.mixing_rate",
            transform.mixing_rate,
            "must be between 0.0 and 1.0",
        ));
    }
    if !positive_finite(transform.clock_speed_ghz) {
        errors.push(invalid(
            "transform.clock_speed_ghz",
            transform.clock_speed_ghz,
            "must be a positive number",
        ));
    }

    // ── Consensus ────────────────────────────────────────────────────
    let consensus = &config.consensus;
    if consensus.version.trim().is_empty() {
        errors.push(invalid(
            "consensus.version",
            "",
            "version label must not be empty",
        ));
    }
    if !positive_finite(consensus.contribution_baseline) {
        errors.push(invalid(
            "consensus.contribution_baseline",
            consensus.contribution_baseline,
            "must be a positive number",
        ));
    }
    if !(consensus.min_support.is_finite() && consensus.min_support >= 0.0) {
        errors.push(invalid(
            "consensus.min_support",
            consensus.min_support,
            "must be zero or a positive number",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
