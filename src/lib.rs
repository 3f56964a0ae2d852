//! # interface-optimizer
//!
//! Optimizes a named configuration ("interface") for a participant in a
//! multi-agent network.
//!
//! ## Architecture
//!
//! Three cooperating components, leaf to root:
//! ```text
//! StochasticTransformUnit   fixed-width bit vectors, multi-shot sampling, mode
//! ConsensusStore            shared knowledge, merge-by-averaging, pruning
//! OptimizationEngine        fingerprint → cache → encode → transform → decode
//!                           → consensus merge → rescale → cache + history
//! ```
//!
//! The transform sits behind the [`StochasticTransform`] trait so the engine
//! never depends on a particular sampling model.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use std::fmt;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod codec;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod interface;
pub mod metrics;
pub mod transform;

// Re-exports for convenience
pub use codec::InterfaceCodec;
pub use consensus::ConsensusStore;
pub use engine::{NetworkConditions, OptimizationEngine, OptimizationRecord};
pub use interface::{merge_values, Fingerprint, Interface, Value};
pub use transform::{
    BitVector, PassthroughTransform, StochasticTransform, StochasticTransformUnit,
    TransformConfig,
};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`OptimizerError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```no_run
/// # use interface_optimizer::{init_tracing, OptimizerError};
/// # fn example() -> Result<(), OptimizerError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), OptimizerError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| OptimizerError::Other(format!("tracing init failed: {e}")))
}

/// Top-level optimizer errors.
///
/// Every failure surfaced by the transform unit, the codec, the engine or the
/// configuration loader maps to a variant here. Consensus type conflicts are
/// resolved by merge policy and never produce an error.
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// A construction or runtime parameter is out of range
    /// (non-positive bandwidth or latency, shot count, mixing rate, depth).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The interface cannot be represented within the transform's bit width.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The transform capacity is zero or above the supported maximum.
    #[error("capacity {capacity} is outside the supported range 1..={max}")]
    CapacityExceeded {
        /// The rejected capacity.
        capacity: usize,
        /// The largest supported capacity.
        max: usize,
    },

    /// A configuration file could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

impl OptimizerError {
    /// Short, stable label used for the `kind` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Encoding(_) => "encoding",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}

impl From<config::validation::ConfigError> for OptimizerError {
    fn from(err: config::validation::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Identifier of an agent contributing knowledge to a [`ConsensusStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(
    /// The raw string ID, e.g. `agent-3`.
    pub String,
);

impl AgentId {
    /// Create a new [`AgentId`] from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the agent ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_display_includes_bounds() {
        let err = OptimizerError::CapacityExceeded {
            capacity: 0,
            max: 4096,
        };
        let msg = err.to_string();
        assert!(msg.contains('0'));
        assert!(msg.contains("4096"));
    }

    #[test]
    fn test_error_kind_labels_are_distinct() {
        let kinds = [
            OptimizerError::InvalidParameter(String::new()).kind(),
            OptimizerError::Encoding(String::new()).kind(),
            OptimizerError::CapacityExceeded {
                capacity: 0,
                max: 1,
            }
            .kind(),
            OptimizerError::Config(String::new()).kind(),
            OptimizerError::Other(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn test_agent_id_as_str_round_trips() {
        let agent = AgentId::new("agent-7");
        assert_eq!(agent.as_str(), "agent-7");
        assert_eq!(agent.to_string(), "agent-7");
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        // First call may succeed or fail depending on test execution order.
        let _ = init_tracing();
        let result = init_tracing();
        assert!(result.is_err(), "double init must return Err, not panic");
    }
}
