//! # Stage: Stochastic Transform
//!
//! ## Responsibility
//! Provide the pluggable probabilistic transform the engine runs each encoded
//! interface through. [`StochasticTransformUnit`] simulates a multi-shot
//! correlated sampling process over a fixed-width register and reduces the
//! shots to their most frequent outcome.
//!
//! ## Guarantees
//! - Fixed width: output always has exactly [`StochasticTransform::width`] bits;
//!   longer input is truncated, shorter input is zero-padded
//! - Bounded: shot count is capped at [`MAX_SHOTS`], depth at
//!   [`MAX_ENTANGLEMENT_DEPTH`], capacity at [`MAX_QUBIT_CAPACITY`]
//! - Deterministic: the sampler is seeded from the configured seed and a digest
//!   of the input, so `process` is a pure function of (config, input)
//! - Tie-break: among equally frequent outcomes the lexicographically smallest
//!   bit-string wins (`0 < 1`, first bit most significant)
//!
//! ## NOT Responsible For
//! - Mapping interfaces to bits (that belongs to `codec`)
//! - Any physical quantum model; the circuit is a classical stand-in

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::OptimizerError;

/// Largest supported register width.
pub const MAX_QUBIT_CAPACITY: usize = 4096;
/// Largest supported shot count per `process` call.
pub const MAX_SHOTS: u32 = 100_000;
/// Largest supported number of correlation rounds.
pub const MAX_ENTANGLEMENT_DEPTH: u32 = 64;

// ── Bit vectors ──────────────────────────────────────────────────────────

/// A fixed-order sequence of bits; index 0 is the most significant.
///
/// Ordering is lexicographic with `0 < 1`, which is the mode tie-break order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitVector(Vec<bool>);

impl BitVector {
    /// All-zero vector of the given width.
    pub fn zeros(width: usize) -> Self {
        Self(vec![false; width])
    }

    /// Parse a string of `0`/`1` characters.
    ///
    /// # Errors
    /// Returns [`OptimizerError::Encoding`] on any other character.
    pub fn parse(s: &str) -> Result<Self, OptimizerError> {
        s.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(OptimizerError::Encoding(format!(
                    "invalid bit character {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if the vector has no bits.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bit at `index`; out-of-range reads are `false`.
    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Set the bit at `index`; out-of-range writes are ignored.
    pub fn set(&mut self, index: usize, bit: bool) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = bit;
        }
    }

    /// Borrow the bits.
    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    /// Truncate to the first `width` bits or zero-pad up to `width`.
    pub fn fitted(&self, width: usize) -> Self {
        let mut bits = self.0.clone();
        bits.resize(width, false);
        Self(bits)
    }

    /// Pack the bits MSB-first into bytes, prefixed with the bit length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.0.len().div_ceil(8));
        out.extend_from_slice(&(self.0.len() as u64).to_be_bytes());
        for chunk in self.0.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | (u8::from(b) << (7 - i)));
            out.push(byte);
        }
        out
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromIterator<bool> for BitVector {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Normalize `bits` to `width`, logging when truncation or padding happens.
pub fn fit_to_width(bits: &BitVector, width: usize) -> BitVector {
    if bits.len() > width {
        debug!(input = bits.len(), width, "truncating input to register width");
    } else if bits.len() < width {
        debug!(input = bits.len(), width, "zero-padding input to register width");
    }
    bits.fitted(width)
}

// ── Strategy seam ────────────────────────────────────────────────────────

/// A fixed-width probabilistic transform over bit vectors.
///
/// Implementations must be thread-safe (Send + Sync) for shared use behind
/// `Arc<dyn StochasticTransform>`.
pub trait StochasticTransform: Send + Sync {
    /// Register width W; `process` always returns exactly W bits.
    fn width(&self) -> usize;

    /// Transform `bits` (fitted to W first) and return the resulting W bits.
    ///
    /// # Errors
    /// Implementation-specific; the built-in transforms never fail.
    fn process(&self, bits: &BitVector) -> Result<BitVector, OptimizerError>;

    /// Diagnostic entropy metric; independent of processed data.
    fn entanglement_entropy(&self) -> f64;

    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;
}

// ── Configuration ────────────────────────────────────────────────────────

/// Construction parameters for a [`StochasticTransformUnit`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TransformConfig {
    /// Register width W in bits. Must be in `1..=4096`.
    #[serde(default = "crate::config::default_qubit_capacity")]
    pub qubit_capacity: usize,
    /// Number of correlation rounds. `0` makes the transform the identity.
    #[serde(default = "crate::config::default_entanglement_depth")]
    pub entanglement_depth: u32,
    /// Independent trials per `process` call. Must be in `1..=100000`.
    #[serde(default = "crate::config::default_shots")]
    pub shots: u32,
    /// Per-bit flip probability of the mixing layer, in `[0.0, 1.0]`.
    #[serde(default = "crate::config::default_mixing_rate")]
    pub mixing_rate: f64,
    /// Base seed for the sampler.
    #[serde(default = "crate::config::default_seed")]
    pub seed: u64,
    /// Nominal clock speed in GHz; descriptive only.
    #[serde(default = "crate::config::default_clock_speed_ghz")]
    pub clock_speed_ghz: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            qubit_capacity: crate::config::default_qubit_capacity(),
            entanglement_depth: crate::config::default_entanglement_depth(),
            shots: crate::config::default_shots(),
            mixing_rate: crate::config::default_mixing_rate(),
            seed: crate::config::default_seed(),
            clock_speed_ghz: crate::config::default_clock_speed_ghz(),
        }
    }
}

impl TransformConfig {
    /// Check every range constraint.
    ///
    /// # Errors
    /// - [`OptimizerError::CapacityExceeded`] for a zero or oversized register
    /// - [`OptimizerError::InvalidParameter`] for shots, depth or mixing rate
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.qubit_capacity == 0 || self.qubit_capacity > MAX_QUBIT_CAPACITY {
            return Err(OptimizerError::CapacityExceeded {
                capacity: self.qubit_capacity,
                max: MAX_QUBIT_CAPACITY,
            });
        }
        if self.shots == 0 || self.shots > MAX_SHOTS {
            return Err(OptimizerError::InvalidParameter(format!(
                "shots must be in 1..={MAX_SHOTS}, got {}",
                self.shots
            )));
        }
        if self.entanglement_depth > MAX_ENTANGLEMENT_DEPTH {
            return Err(OptimizerError::InvalidParameter(format!(
                "entanglement_depth must be at most {MAX_ENTANGLEMENT_DEPTH}, got {}",
                self.entanglement_depth
            )));
        }
        if !(0.0..=1.0).contains(&self.mixing_rate) {
            return Err(OptimizerError::InvalidParameter(format!(
                "mixing_rate must be between 0.0 and 1.0, got {}",
                self.mixing_rate
            )));
        }
        Ok(())
    }
}

// ── Simulation ───────────────────────────────────────────────────────────

/// Multi-shot correlated sampler over a fixed-width register.
///
/// Each shot loads the input, then applies `entanglement_depth` rounds of a
/// CNOT chain (`b[j+1] ^= b[j]`, in order) followed by a mixing layer that
/// flips every bit with probability `mixing_rate`. The output is the mode of
/// all shots.
#[derive(Debug, Clone)]
pub struct StochasticTransformUnit {
    config: TransformConfig,
}

impl StochasticTransformUnit {
    /// Build a unit from a validated configuration.
    ///
    /// # Errors
    /// See [`TransformConfig::validate`].
    pub fn new(config: TransformConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Build a unit with default shots, mixing rate and seed.
    ///
    /// # Errors
    /// See [`TransformConfig::validate`].
    pub fn with_capacity(
        qubit_capacity: usize,
        entanglement_depth: u32,
    ) -> Result<Self, OptimizerError> {
        Self::new(TransformConfig {
            qubit_capacity,
            entanglement_depth,
            ..TransformConfig::default()
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Run every shot on `bits` and count each distinct outcome.
    ///
    /// Deterministic for a given configuration and input.
    pub fn sample(&self, bits: &BitVector) -> BTreeMap<BitVector, u32> {
        let input = fit_to_width(bits, self.width());
        let mut rng = StdRng::seed_from_u64(self.seed_for(&input));

        let mut counts: BTreeMap<BitVector, u32> = BTreeMap::new();
        for _ in 0..self.config.shots {
            *counts.entry(self.run_shot(&input, &mut rng)).or_insert(0) += 1;
        }

        debug!(
            shots = self.config.shots,
            distinct = counts.len(),
            depth = self.config.entanglement_depth,
            "transform sampled"
        );
        counts
    }

    fn seed_for(&self, input: &BitVector) -> u64 {
        let digest = blake3::hash(&input.to_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        self.config.seed ^ u64::from_le_bytes(head)
    }

    fn run_shot(&self, input: &BitVector, rng: &mut StdRng) -> BitVector {
        let mut state = input.as_slice().to_vec();
        for _ in 0..self.config.entanglement_depth {
            for j in 1..state.len() {
                if state[j - 1] {
                    state[j] = !state[j];
                }
            }
            if self.config.mixing_rate > 0.0 {
                for bit in state.iter_mut() {
                    if rng.gen_bool(self.config.mixing_rate) {
                        *bit = !*bit;
                    }
                }
            }
        }
        BitVector(state)
    }
}

/// Most frequent outcome; ties go to the smallest bit-string.
///
/// `BTreeMap` iterates in ascending key order and only a strictly greater
/// count replaces the current best, so the first (smallest) tied key wins.
fn select_mode(counts: &BTreeMap<BitVector, u32>) -> Option<BitVector> {
    let mut best: Option<(&BitVector, u32)> = None;
    for (outcome, &count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((outcome, count)),
        }
    }
    best.map(|(outcome, _)| outcome.clone())
}

impl StochasticTransform for StochasticTransformUnit {
    fn width(&self) -> usize {
        self.config.qubit_capacity
    }

    fn process(&self, bits: &BitVector) -> Result<BitVector, OptimizerError> {
        let counts = self.sample(bits);
        // shots >= 1 is enforced at construction, so counts is never empty.
        Ok(select_mode(&counts).unwrap_or_else(|| fit_to_width(bits, self.width())))
    }

    fn entanglement_entropy(&self) -> f64 {
        let depth = f64::from(self.config.entanglement_depth);
        (self.config.qubit_capacity as f64).log2() * (1.0 - (-depth).exp())
    }

    fn name(&self) -> &'static str {
        "stochastic"
    }
}

impl fmt::Display for StochasticTransformUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stochastic transform unit: {} qubits @ {} GHz (depth {}, {} shots)",
            self.config.qubit_capacity,
            self.config.clock_speed_ghz,
            self.config.entanglement_depth,
            self.config.shots
        )
    }
}

// ── Test double ──────────────────────────────────────────────────────────

/// Deterministic transform that returns its input fitted to the register width.
///
/// Useful for pipeline tests that need exact, predictable decode results.
#[derive(Debug, Clone)]
pub struct PassthroughTransform {
    width: usize,
}

impl PassthroughTransform {
    /// Create a pass-through register of the given width.
    ///
    /// # Errors
    /// Returns [`OptimizerError::CapacityExceeded`] for a zero or oversized width.
    pub fn new(width: usize) -> Result<Self, OptimizerError> {
        if width == 0 || width > MAX_QUBIT_CAPACITY {
            return Err(OptimizerError::CapacityExceeded {
                capacity: width,
                max: MAX_QUBIT_CAPACITY,
            });
        }
        Ok(Self { width })
    }
}

impl StochasticTransform for PassthroughTransform {
    fn width(&self) -> usize {
        self.width
    }

    fn process(&self, bits: &BitVector) -> Result<BitVector, OptimizerError> {
        Ok(fit_to_width(bits, self.width))
    }

    fn entanglement_entropy(&self) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
