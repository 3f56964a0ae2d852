//! # Stage: Optimization Engine
//!
//! ## Responsibility
//! Run one optimize request end to end:
//! ```text
//! fingerprint → cache? → encode → transform → decode → consensus merge
//!             → rescale → cache store → history append
//! ```
//!
//! ## Guarantees
//! - Memoized: a fingerprint already in the cache is served without running
//!   any further stage and without recording history
//! - Single-flight: concurrent misses for one fingerprint serialize on a
//!   per-fingerprint in-flight lock; the second waits and reuses the first's
//!   result. Hits read the completed map and never take that lock
//! - All-or-nothing: a failing request writes neither a cache entry nor a
//!   history record, leaves no in-flight entry behind, and a later request
//!   for the same fingerprint retries
//! - Append-only history: one [`OptimizationRecord`] per cache miss, never
//!   mutated or removed
//!
//! ## NOT Responsible For
//! - Sampling (that belongs to `transform`)
//! - Owning shared knowledge (the [`ConsensusStore`] is shared by reference)
//! - Cache eviction: the cache grows with the number of distinct interfaces

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::codec::InterfaceCodec;
use crate::config::OptimizerConfig;
use crate::consensus::ConsensusStore;
use crate::interface::{merge_values, Fingerprint, Interface, Value};
use crate::transform::{StochasticTransform, StochasticTransformUnit, TransformConfig};
use crate::{metrics, OptimizerError};

/// Reference bandwidth (Gbps) at which the bandwidth factor is 1.0.
pub const BASELINE_BANDWIDTH_GBPS: f64 = 10.0;
/// Reference latency (ms) at which the latency factor is 1.0.
pub const BASELINE_LATENCY_MS: f64 = 10.0;

// ── Network conditions ───────────────────────────────────────────────────

/// Current network conditions used by the fine-tuning stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConditions {
    /// Available bandwidth in Gbps. Must be finite and > 0.
    pub bandwidth_gbps: f64,
    /// Network latency in milliseconds. Must be finite and > 0.
    pub latency_ms: f64,
}

impl NetworkConditions {
    /// Build validated conditions.
    ///
    /// # Errors
    /// Returns [`OptimizerError::InvalidParameter`] if either value is
    /// non-positive or non-finite.
    pub fn new(bandwidth_gbps: f64, latency_ms: f64) -> Result<Self, OptimizerError> {
        let conditions = Self {
            bandwidth_gbps,
            latency_ms,
        };
        conditions.validate()?;
        Ok(conditions)
    }

    /// Check both values are finite and strictly positive.
    ///
    /// # Errors
    /// Returns [`OptimizerError::InvalidParameter`] naming the bad value.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.bandwidth_gbps.is_finite() && self.bandwidth_gbps > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "bandwidth must be positive, got {} Gbps",
                self.bandwidth_gbps
            )));
        }
        if !(self.latency_ms.is_finite() && self.latency_ms > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "latency must be positive, got {} ms",
                self.latency_ms
            )));
        }
        Ok(())
    }

    /// `(bandwidth / 10 Gbps) * (10 ms / latency)`.
    pub fn scale_factor(&self) -> f64 {
        (self.bandwidth_gbps / BASELINE_BANDWIDTH_GBPS) * (BASELINE_LATENCY_MS / self.latency_ms)
    }
}

// ── History ──────────────────────────────────────────────────────────────

/// Immutable snapshot of one cache-miss optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRecord {
    /// Position in the history, starting at 0.
    pub sequence: u64,
    /// Fingerprint of `original`.
    pub fingerprint: Fingerprint,
    /// The interface as submitted.
    pub original: Interface,
    /// The interface as returned and cached.
    pub optimized: Interface,
    /// Bandwidth (Gbps) at the time of the run.
    pub bandwidth_gbps: f64,
    /// Latency (ms) at the time of the run.
    pub latency_ms: f64,
    /// Transform entropy at the time of the run.
    pub entropy: f64,
}

// ── Engine ───────────────────────────────────────────────────────────────

/// Per-fingerprint lock held while a miss is being computed.
type Flight = Arc<Mutex<()>>;

/// Orchestrates fingerprinting, caching, transform, consensus merge and rescaling.
///
/// Shareable across threads (`Arc<OptimizationEngine>`); all methods take `&self`.
pub struct OptimizationEngine {
    network: RwLock<NetworkConditions>,
    transform: Arc<dyn StochasticTransform>,
    codec: InterfaceCodec,
    consensus: Arc<ConsensusStore>,
    completed: DashMap<Fingerprint, Interface>,
    in_flight: DashMap<Fingerprint, Flight>,
    history: RwLock<Vec<OptimizationRecord>>,
}

impl OptimizationEngine {
    /// Assemble an engine from its parts.
    ///
    /// The codec width follows the transform's register width.
    pub fn new(
        network: NetworkConditions,
        transform: Arc<dyn StochasticTransform>,
        consensus: Arc<ConsensusStore>,
    ) -> Self {
        let codec = InterfaceCodec::new(transform.width());
        Self {
            network: RwLock::new(network),
            transform,
            codec,
            consensus,
            completed: DashMap::new(),
            in_flight: DashMap::new(),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Build an engine with a [`StochasticTransformUnit`] from raw parameters.
    ///
    /// # Errors
    /// - [`OptimizerError::InvalidParameter`] for bad bandwidth, latency or depth
    /// - [`OptimizerError::CapacityExceeded`] for a zero or oversized capacity
    pub fn with_parameters(
        bandwidth_gbps: f64,
        latency_ms: f64,
        qubit_capacity: usize,
        entanglement_depth: u32,
        consensus: Arc<ConsensusStore>,
    ) -> Result<Self, OptimizerError> {
        let network = NetworkConditions::new(bandwidth_gbps, latency_ms)?;
        let transform = StochasticTransformUnit::new(TransformConfig {
            qubit_capacity,
            entanglement_depth,
            ..TransformConfig::default()
        })?;
        Ok(Self::new(network, Arc::new(transform), consensus))
    }

    /// Build an engine from a loaded configuration.
    ///
    /// # Errors
    /// Same as [`OptimizationEngine::with_parameters`].
    pub fn from_config(
        config: &OptimizerConfig,
        consensus: Arc<ConsensusStore>,
    ) -> Result<Self, OptimizerError> {
        let network =
            NetworkConditions::new(config.network.bandwidth_gbps, config.network.latency_ms)?;
        let transform = StochasticTransformUnit::new(config.transform.clone())?;
        Ok(Self::new(network, Arc::new(transform), consensus))
    }

    /// Optimize an interface, serving from cache when possible.
    ///
    /// # Errors
    /// - [`OptimizerError::InvalidParameter`] if the network conditions are invalid
    /// - [`OptimizerError::Encoding`] if the interface does not fit the register
    /// - any error returned by the transform
    ///
    /// On error nothing is cached and no history is recorded.
    pub fn optimize(&self, interface: &Interface) -> Result<Interface, OptimizerError> {
        let fingerprint = interface.fingerprint();
        if let Some(hit) = self.completed_hit(&fingerprint) {
            return Ok(hit);
        }

        let flight = self.in_flight.entry(fingerprint).or_default().clone();
        let result = {
            let _guard = flight.lock();
            // A concurrent miss may have finished while we waited.
            match self.completed_hit(&fingerprint) {
                Some(hit) => Ok(hit),
                None => self.compute(fingerprint, interface),
            }
        };
        drop(flight);
        // Clones are taken under the shard lock, so a count of 1 means no waiter.
        self.in_flight
            .remove_if(&fingerprint, |_, f| Arc::strong_count(f) == 1);
        result
    }

    fn completed_hit(&self, fingerprint: &Fingerprint) -> Option<Interface> {
        let hit = self.completed.get(fingerprint)?.value().clone();
        debug!(fingerprint = %fingerprint.short(), "cache hit");
        metrics::inc_request("hit");
        Some(hit)
    }

    /// Cache-miss path; caller holds the in-flight lock for `fingerprint`.
    fn compute(
        &self,
        fingerprint: Fingerprint,
        interface: &Interface,
    ) -> Result<Interface, OptimizerError> {
        metrics::inc_request("miss");

        let started = Instant::now();
        let (optimized, network) = match self.run_pipeline(interface) {
            Ok(out) => out,
            Err(e) => {
                warn!(fingerprint = %fingerprint.short(), error = %e, "optimize failed");
                metrics::inc_error(e.kind());
                return Err(e);
            }
        };

        let entropy = self.transform.entanglement_entropy();
        let sequence = {
            let mut history = self.history.write();
            let sequence = history.len() as u64;
            history.push(OptimizationRecord {
                sequence,
                fingerprint,
                original: interface.clone(),
                optimized: optimized.clone(),
                bandwidth_gbps: network.bandwidth_gbps,
                latency_ms: network.latency_ms,
                entropy,
            });
            sequence
        };
        self.completed.insert(fingerprint, optimized.clone());

        metrics::record_stage_latency("optimize", started.elapsed());
        info!(
            fingerprint = %fingerprint.short(),
            sequence,
            fields = optimized.len(),
            entropy,
            elapsed_us = started.elapsed().as_micros() as u64,
            "interface optimized"
        );
        Ok(optimized)
    }

    /// Run [`OptimizationEngine::optimize`] on tokio's blocking pool.
    ///
    /// # Errors
    /// Same as `optimize`, plus [`OptimizerError::Other`] if the blocking task
    /// panicked or was cancelled.
    pub async fn optimize_async(
        self: &Arc<Self>,
        interface: Interface,
    ) -> Result<Interface, OptimizerError> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || engine.optimize(&interface))
            .await
            .map_err(|e| OptimizerError::Other(format!("optimize task failed: {e}")))?
    }

    /// Stages 3–7: encode, transform, decode, consensus merge, rescale.
    fn run_pipeline(
        &self,
        interface: &Interface,
    ) -> Result<(Interface, NetworkConditions), OptimizerError> {
        let network = self.network_conditions();
        network.validate()?;

        let stage = Instant::now();
        let encoded = self.codec.encode(interface)?;
        metrics::record_stage_latency("encode", stage.elapsed());

        let stage = Instant::now();
        let sampled = self.transform.process(encoded.bits())?;
        metrics::record_stage_latency("transform", stage.elapsed());
        debug!(
            transform = self.transform.name(),
            input = %encoded.bits(),
            output = %sampled,
            "transform complete"
        );

        let mut result = self.codec.decode(&encoded, &sampled)?;

        let stage = Instant::now();
        let wisdom = self.consensus.collective_wisdom();
        let merged = apply_collective_wisdom(&mut result, &wisdom);
        metrics::record_stage_latency("consensus_merge", stage.elapsed());

        let scale_factor = network.scale_factor();
        rescale(&mut result, scale_factor);
        debug!(merged, scale_factor, "fine-tuned for network conditions");

        Ok((result, network))
    }

    /// Replace the network conditions used by future cache-miss runs.
    ///
    /// Results already cached are not recomputed.
    ///
    /// # Errors
    /// Returns [`OptimizerError::InvalidParameter`] and keeps the old
    /// conditions if either value is invalid.
    pub fn set_network_conditions(
        &self,
        bandwidth_gbps: f64,
        latency_ms: f64,
    ) -> Result<(), OptimizerError> {
        let conditions = NetworkConditions::new(bandwidth_gbps, latency_ms)?;
        *self.network.write() = conditions;
        info!(bandwidth_gbps, latency_ms, "network conditions updated");
        Ok(())
    }

    /// Current network conditions.
    pub fn network_conditions(&self) -> NetworkConditions {
        *self.network.read()
    }

    /// Snapshot of the optimization history, oldest first.
    pub fn history(&self) -> Vec<OptimizationRecord> {
        self.history.read().clone()
    }

    /// Number of history records.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Number of cached results.
    pub fn cache_len(&self) -> usize {
        self.completed.len()
    }

    /// Number of fingerprints with a miss currently being computed or awaited.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Cached result for a fingerprint, if present.
    pub fn cached(&self, fingerprint: &Fingerprint) -> Option<Interface> {
        self.completed.get(fingerprint).map(|hit| hit.value().clone())
    }

    /// The shared consensus store consulted during optimization.
    pub fn consensus(&self) -> &Arc<ConsensusStore> {
        &self.consensus
    }

    /// The transform in use.
    pub fn transform(&self) -> &Arc<dyn StochasticTransform> {
        &self.transform
    }

    /// The codec in use.
    pub fn codec(&self) -> &InterfaceCodec {
        &self.codec
    }
}

/// Merge every key present in both `result` and `wisdom`; returns how many merged.
fn apply_collective_wisdom(result: &mut Interface, wisdom: &Interface) -> usize {
    let mut merged = 0;
    for (key, local) in result.iter_mut() {
        if let Some(collective) = wisdom.get(key) {
            *local = merge_values(local, collective);
            merged += 1;
        }
    }
    merged
}

/// Multiply every numeric field by `factor`; opaque fields are untouched.
fn rescale(result: &mut Interface, factor: f64) {
    for (_, value) in result.iter_mut() {
        if let Value::Number(n) = value {
            *n *= factor;
        }
    }
}

impl fmt::Debug for OptimizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationEngine")
            .field("network", &self.network_conditions())
            .field("transform", &self.transform.name())
            .field("width", &self.codec.width())
            .field("cached", &self.cache_len())
            .field("history", &self.history_len())
            .finish()
    }
}

impl fmt::Display for OptimizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let network = self.network_conditions();
        write!(
            f,
            "Interface optimization engine (bandwidth: {} Gbps, latency: {} ms)",
            network.bandwidth_gbps, network.latency_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{BitVector, PassthroughTransform};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::AgentId;

    fn passthrough_engine(bandwidth: f64, latency: f64) -> OptimizationEngine {
        OptimizationEngine::new(
            NetworkConditions::new(bandwidth, latency).expect("test: network"),
            Arc::new(PassthroughTransform::new(64).expect("test: width")),
            Arc::new(ConsensusStore::default()),
        )
    }

    /// Fails the first `failures` calls, then passes input through.
    struct FlakyTransform {
        failures: AtomicUsize,
    }

    impl StochasticTransform for FlakyTransform {
        fn width(&self) -> usize {
            64
        }

        fn process(&self, bits: &BitVector) -> Result<BitVector, OptimizerError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(OptimizerError::Other("transform backend unavailable".into()));
            }
            Ok(bits.fitted(64))
        }

        fn entanglement_entropy(&self) -> f64 {
            0.0
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[test]
    fn test_scale_factor_baseline_is_one() {
        let n = NetworkConditions::new(10.0, 10.0).expect("test: network");
        assert!((n.scale_factor() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scale_factor_double_bandwidth_half_latency_is_four() {
        let n = NetworkConditions::new(20.0, 5.0).expect("test: network");
        assert!((n.scale_factor() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_latency_returns_invalid_parameter() {
        let result = OptimizationEngine::with_parameters(
            10.0,
            0.0,
            64,
            3,
            Arc::new(ConsensusStore::default()),
        );
        assert!(matches!(result, Err(OptimizerError::InvalidParameter(_))));
    }

    #[test]
    fn test_negative_bandwidth_returns_invalid_parameter() {
        let result = OptimizationEngine::with_parameters(
            -1.0,
            10.0,
            64,
            3,
            Arc::new(ConsensusStore::default()),
        );
        assert!(matches!(result, Err(OptimizerError::InvalidParameter(_))));
    }

    #[test]
    fn test_zero_capacity_returns_capacity_exceeded() {
        let result = OptimizationEngine::with_parameters(
            10.0,
            10.0,
            0,
            3,
            Arc::new(ConsensusStore::default()),
        );
        assert!(matches!(result, Err(OptimizerError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_set_network_conditions_rejects_invalid_and_keeps_old() {
        let engine = passthrough_engine(10.0, 10.0);
        assert!(matches!(
            engine.set_network_conditions(10.0, 0.0),
            Err(OptimizerError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.set_network_conditions(f64::NAN, 10.0),
            Err(OptimizerError::InvalidParameter(_))
        ));
        assert_eq!(engine.network_conditions().latency_ms, 10.0);
    }

    #[test]
    fn test_passthrough_baseline_returns_input_values() {
        let engine = passthrough_engine(10.0, 10.0);
        let iface = Interface::new().with("param_a", 4.0);
        let out = engine.optimize(&iface).expect("test: optimize");
        assert_eq!(out, iface);
        assert_eq!(engine.history_len(), 1);
        assert_eq!(engine.cache_len(), 1);
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let engine = passthrough_engine(10.0, 10.0);
        let iface = Interface::new().with("param_a", 4.0).with("mode", "fast");
        let first = engine.optimize(&iface).expect("test: optimize");
        let second = engine.optimize(&iface).expect("test: optimize");
        assert_eq!(first, second);
        assert_eq!(engine.history_len(), 1);
        assert_eq!(engine.cached(&iface.fingerprint()), Some(first));
    }

    #[test]
    fn test_cache_hit_ignores_later_consensus_changes() {
        let engine = passthrough_engine(10.0, 10.0);
        let iface = Interface::new().with("param_a", 4.0);
        let first = engine.optimize(&iface).expect("test: optimize");
        engine
            .consensus()
            .update(&AgentId::new("peer"), &Interface::new().with("param_a", 100.0));
        let second = engine.optimize(&iface).expect("test: optimize");
        assert_eq!(first, second);
    }

    #[test]
    fn test_collective_wisdom_is_averaged_in() {
        let engine = passthrough_engine(10.0, 10.0);
        engine.consensus().update(
            &AgentId::new("peer"),
            &Interface::new().with("param_a", 2.0).with("unrelated", 9.0),
        );
        let out = engine
            .optimize(&Interface::new().with("param_a", 4.0))
            .expect("test: optimize");
        assert_eq!(out.get("param_a"), Some(&Value::Number(3.0)));
        assert!(!out.contains_key("unrelated"));
    }

    #[test]
    fn test_collective_opaque_value_overwrites() {
        let engine = passthrough_engine(10.0, 10.0);
        engine
            .consensus()
            .update(&AgentId::new("peer"), &Interface::new().with("mode", "safe"));
        let out = engine
            .optimize(&Interface::new().with("mode", "fast"))
            .expect("test: optimize");
        assert_eq!(out.get("mode"), Some(&Value::Text("safe".into())));
    }

    #[test]
    fn test_rescale_applies_to_numbers_only() {
        let engine = passthrough_engine(20.0, 5.0);
        let iface = Interface::new()
            .with("param_a", 4.0)
            .with("enabled", true)
            .with("mode", "fast");
        let out = engine.optimize(&iface).expect("test: optimize");
        assert_eq!(out.get("param_a"), Some(&Value::Number(16.0)));
        assert_eq!(out.get("enabled"), Some(&Value::Bool(true)));
        assert_eq!(out.get("mode"), Some(&Value::Text("fast".into())));
    }

    #[test]
    fn test_history_record_captures_run_conditions() {
        let engine = passthrough_engine(20.0, 5.0);
        let iface = Interface::new().with("param_a", 4.0);
        let out = engine.optimize(&iface).expect("test: optimize");
        let history = engine.history();
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.sequence, 0);
        assert_eq!(record.fingerprint, iface.fingerprint());
        assert_eq!(record.original, iface);
        assert_eq!(record.optimized, out);
        assert_eq!(record.bandwidth_gbps, 20.0);
        assert_eq!(record.latency_ms, 5.0);
    }

    #[test]
    fn test_encoding_error_leaves_no_cache_or_history() {
        let engine = OptimizationEngine::new(
            NetworkConditions::new(10.0, 10.0).expect("test: network"),
            Arc::new(PassthroughTransform::new(8).expect("test: width")),
            Arc::new(ConsensusStore::default()),
        );
        let iface: Interface = (0..3).map(|i| (format!("k{i}"), 1.0)).collect();
        assert!(matches!(engine.optimize(&iface), Err(OptimizerError::Encoding(_))));
        assert_eq!(engine.cache_len(), 0);
        assert_eq!(engine.history_len(), 0);
        assert!(engine.cached(&iface.fingerprint()).is_none());
    }

    #[test]
    fn test_failed_requests_leave_no_in_flight_entries() {
        let engine = OptimizationEngine::new(
            NetworkConditions::new(10.0, 10.0).expect("test: network"),
            Arc::new(PassthroughTransform::new(8).expect("test: width")),
            Arc::new(ConsensusStore::default()),
        );
        for n in 0..200_i32 {
            let iface = Interface::new()
                .with("a", f64::from(n))
                .with("b", 1.0)
                .with("c", 2.0);
            assert!(matches!(engine.optimize(&iface), Err(OptimizerError::Encoding(_))));
        }
        assert_eq!(engine.in_flight_len(), 0);
        assert_eq!(engine.cache_len(), 0);
        assert_eq!(engine.history_len(), 0);
    }

    #[test]
    fn test_successful_request_releases_in_flight_entry() {
        let engine = passthrough_engine(10.0, 10.0);
        let iface = Interface::new().with("param_a", 4.0);
        engine.optimize(&iface).expect("test: optimize");
        engine.optimize(&iface).expect("test: optimize");
        assert_eq!(engine.in_flight_len(), 0);
        assert_eq!(engine.cache_len(), 1);
    }

    #[test]
    fn test_concurrent_hits_return_cached_result() {
        let engine = Arc::new(passthrough_engine(10.0, 10.0));
        let iface = Interface::new().with("param_a", 4.0);
        let expected = engine.optimize(&iface).expect("test: warm");
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let iface = iface.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let out = engine.optimize(&iface).expect("test: optimize");
                    let peek = engine.cached(&iface.fingerprint());
                    (out, peek)
                })
            })
            .collect();

        for handle in handles {
            let (out, peek) = handle.join().expect("test: join");
            assert_eq!(out, expected);
            assert_eq!(peek, Some(expected.clone()));
        }
        assert_eq!(engine.history_len(), 1);
        assert_eq!(engine.in_flight_len(), 0);
    }

    #[test]
    fn test_transform_failure_is_not_cached_and_retry_succeeds() {
        let engine = OptimizationEngine::new(
            NetworkConditions::new(10.0, 10.0).expect("test: network"),
            Arc::new(FlakyTransform {
                failures: AtomicUsize::new(1),
            }),
            Arc::new(ConsensusStore::default()),
        );
        let iface = Interface::new().with("param_a", 4.0);
        assert!(engine.optimize(&iface).is_err());
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.cache_len(), 0);
        assert_eq!(engine.in_flight_len(), 0);

        let out = engine.optimize(&iface).expect("test: retry");
        assert_eq!(out, iface);
        assert_eq!(engine.history_len(), 1);
    }

    #[test]
    fn test_changed_conditions_apply_to_new_interfaces_only() {
        let engine = passthrough_engine(10.0, 10.0);
        let a = Interface::new().with("x", 2.0);
        let b = Interface::new().with("y", 2.0);
        let a_first = engine.optimize(&a).expect("test: optimize");
        engine
            .set_network_conditions(20.0, 10.0)
            .expect("test: conditions");
        assert_eq!(engine.optimize(&a).expect("test: optimize"), a_first);
        let b_out = engine.optimize(&b).expect("test: optimize");
        assert_eq!(b_out.get("y"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_stochastic_result_stays_in_octave() {
        let engine = OptimizationEngine::with_parameters(
            10.0,
            10.0,
            64,
            3,
            Arc::new(ConsensusStore::default()),
        )
        .expect("test: engine");
        let out = engine
            .optimize(&Interface::new().with("param_a", 4.0))
            .expect("test: optimize");
        let value = out.get("param_a").and_then(Value::as_number).unwrap_or_default();
        assert!((4.0..8.0).contains(&value), "got {value}");
    }

    #[test]
    fn test_concurrent_same_interface_computes_once() {
        let engine = Arc::new(
            OptimizationEngine::with_parameters(
                10.0,
                10.0,
                64,
                3,
                Arc::new(ConsensusStore::default()),
            )
            .expect("test: engine"),
        );
        let iface = Interface::new().with("param_a", 4.0).with("param_b", 1.5);
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let iface = iface.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.optimize(&iface)
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("test: join").expect("test: optimize"))
            .collect();

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(engine.history_len(), 1);
        assert_eq!(engine.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_optimize_async_matches_sync_result() {
        let engine = Arc::new(passthrough_engine(10.0, 10.0));
        let iface = Interface::new().with("param_a", 4.0);
        let async_out = engine
            .optimize_async(iface.clone())
            .await
            .expect("test: optimize");
        let sync_out = engine.optimize(&iface).expect("test: optimize");
        assert_eq!(async_out, sync_out);
        assert_eq!(engine.history_len(), 1);
    }

    #[test]
    fn test_display_mentions_network_conditions() {
        let engine = passthrough_engine(10.0, 10.0);
        assert_eq!(
            engine.to_string(),
            "Interface optimization engine (bandwidth: 10 Gbps, latency: 10 ms)"
        );
    }
}
