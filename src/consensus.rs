//! # Stage: Consensus Store
//!
//! ## Responsibility
//! Hold the shared knowledge contributed by many agents, merge conflicting
//! submissions into a single view, score each agent's latest contribution, and
//! prune entries that have gone stale or lost support.
//!
//! ## Guarantees
//! - Atomic updates: each [`ConsensusStore::update`] holds the write lock for
//!   its whole merge + prune pass
//! - Snapshot-consistent reads: [`ConsensusStore::collective_wisdom`] never
//!   observes a half-merged state
//! - Merge policy: numeric conflicts average, anything else overwrites
//!   (see [`merge_values`]); merging a value with itself is a no-op
//! - Scores are per-submission: the latest update from an agent replaces its score
//!
//! ## NOT Responsible For
//! - Transport between agents (knowledge arrives in memory)
//! - Optimizing interfaces (that belongs to `engine`)

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::interface::{merge_values, Interface, Value};
use crate::{metrics, AgentId, OptimizerError};

/// Tunables for merge scoring and pruning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConsensusConfig {
    /// Protocol version, reported in `Display`.
    #[serde(default = "crate::config::default_consensus_version")]
    pub version: String,
    /// Key count that maps to a contribution score of 1.0.
    #[serde(default = "crate::config::default_contribution_baseline")]
    pub contribution_baseline: f64,
    /// Prune entries not touched within this many store updates. `0` disables.
    #[serde(default = "crate::config::default_stale_after_updates")]
    pub stale_after_updates: u64,
    /// Prune entries whose supporters' combined score is below this. `0.0` disables.
    ///
    /// A consensus threshold such as `0.75` keeps only entries backed by agents
    /// whose scores sum to at least three quarters of a baseline contribution.
    #[serde(default)]
    pub min_support: f64,
    /// Cap on stored entries; least-recently-touched are evicted first. `0` is unbounded.
    #[serde(default)]
    pub max_entries: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            version: crate::config::default_consensus_version(),
            contribution_baseline: crate::config::default_contribution_baseline(),
            stale_after_updates: crate::config::default_stale_after_updates(),
            min_support: 0.0,
            max_entries: 0,
        }
    }
}

impl ConsensusConfig {
    /// Check every range constraint.
    ///
    /// # Errors
    /// Returns [`OptimizerError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.contribution_baseline.is_finite() && self.contribution_baseline > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "contribution_baseline must be positive, got {}",
                self.contribution_baseline
            )));
        }
        if !(self.min_support.is_finite() && self.min_support >= 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "min_support must be non-negative, got {}",
                self.min_support
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct KnowledgeEntry {
    value: Value,
    last_touched: u64,
    supporters: BTreeSet<AgentId>,
}

#[derive(Debug, Default)]
struct Inner {
    knowledge: BTreeMap<String, KnowledgeEntry>,
    contributions: HashMap<AgentId, f64>,
    epoch: u64,
}

impl Inner {
    fn support(&self, entry: &KnowledgeEntry) -> f64 {
        entry
            .supporters
            .iter()
            .filter_map(|agent| self.contributions.get(agent))
            .sum()
    }
}

/// Counts of entries removed by one pruning pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    /// Removed for not being touched recently enough.
    pub stale: usize,
    /// Removed for insufficient contributor support.
    pub unsupported: usize,
    /// Evicted to respect `max_entries`.
    pub evicted: usize,
}

impl PruneReport {
    /// Total entries removed.
    pub fn total(&self) -> usize {
        self.stale + self.unsupported + self.evicted
    }
}

/// Shared, multi-writer knowledge store.
///
/// Share it between agents with `Arc<ConsensusStore>`; all methods take `&self`.
pub struct ConsensusStore {
    config: ConsensusConfig,
    inner: RwLock<Inner>,
}

impl ConsensusStore {
    /// Create an empty store.
    ///
    /// # Errors
    /// See [`ConsensusConfig::validate`].
    pub fn new(config: ConsensusConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: RwLock::new(Inner::default()),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Merge an agent's knowledge into the shared view, rescore the agent, and prune.
    pub fn update(&self, agent: &AgentId, knowledge: &Interface) {
        let started = Instant::now();
        let mut inner = self.inner.write();
        inner.epoch += 1;
        let epoch = inner.epoch;

        let mut inserted = 0usize;
        let mut merged = 0usize;
        for (key, value) in knowledge {
            match inner.knowledge.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.value = merge_values(&entry.value, value);
                    entry.last_touched = epoch;
                    entry.supporters.insert(agent.clone());
                    merged += 1;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(KnowledgeEntry {
                        value: value.clone(),
                        last_touched: epoch,
                        supporters: BTreeSet::from([agent.clone()]),
                    });
                    inserted += 1;
                }
            }
        }

        let score = knowledge.len() as f64 / self.config.contribution_baseline;
        inner.contributions.insert(agent.clone(), score);

        let report = self.prune(&mut inner);
        let entries = inner.knowledge.len();
        drop(inner);

        if report.total() > 0 {
            warn!(
                agent = %agent,
                stale = report.stale,
                unsupported = report.unsupported,
                evicted = report.evicted,
                "pruned consensus knowledge"
            );
        }
        info!(
            agent = %agent,
            epoch,
            inserted,
            merged,
            entries,
            score,
            "consensus updated"
        );

        metrics::inc_consensus_update();
        metrics::set_consensus_entries(entries);
        metrics::record_stage_latency("consensus_update", started.elapsed());
    }

    fn prune(&self, inner: &mut Inner) -> PruneReport {
        let mut report = PruneReport::default();
        let epoch = inner.epoch;

        let limit = self.config.stale_after_updates;
        if limit > 0 {
            let before = inner.knowledge.len();
            inner
                .knowledge
                .retain(|_, entry| epoch - entry.last_touched <= limit);
            report.stale = before - inner.knowledge.len();
        }

        if self.config.min_support > 0.0 {
            let weak: Vec<String> = inner
                .knowledge
                .iter()
                .filter(|(_, entry)| inner.support(entry) < self.config.min_support)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &weak {
                inner.knowledge.remove(key);
            }
            report.unsupported = weak.len();
        }

        let cap = self.config.max_entries;
        if cap > 0 && inner.knowledge.len() > cap {
            let mut by_age: Vec<(u64, String)> = inner
                .knowledge
                .iter()
                .map(|(key, entry)| (entry.last_touched, key.clone()))
                .collect();
            by_age.sort();
            let excess = inner.knowledge.len() - cap;
            for (_, key) in by_age.into_iter().take(excess) {
                inner.knowledge.remove(&key);
            }
            report.evicted = excess;
        }

        if report.total() > 0 {
            debug!(?report, remaining = inner.knowledge.len(), "prune pass");
        }
        report
    }

    /// Snapshot of the current shared knowledge.
    pub fn collective_wisdom(&self) -> Interface {
        let inner = self.inner.read();
        inner
            .knowledge
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Latest contribution score for an agent.
    pub fn contribution(&self, agent: &AgentId) -> Option<f64> {
        self.inner.read().contributions.get(agent).copied()
    }

    /// Snapshot of all contribution scores.
    pub fn contributions(&self) -> BTreeMap<AgentId, f64> {
        self.inner
            .read()
            .contributions
            .iter()
            .map(|(agent, score)| (agent.clone(), *score))
            .collect()
    }

    /// Combined current score of the agents that contributed to `key`.
    pub fn support(&self, key: &str) -> Option<f64> {
        let inner = self.inner.read();
        inner.knowledge.get(key).map(|entry| inner.support(entry))
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().knowledge.len()
    }

    /// `true` if no knowledge is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().knowledge.is_empty()
    }

    /// Number of `update` calls applied so far.
    pub fn update_count(&self) -> u64 {
        self.inner.read().epoch
    }
}

impl Default for ConsensusStore {
    fn default() -> Self {
        Self {
            config: ConsensusConfig::default(),
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl fmt::Debug for ConsensusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusStore")
            .field("version", &self.config.version)
            .field("entries", &self.len())
            .field("updates", &self.update_count())
            .finish()
    }
}

impl fmt::Display for ConsensusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collective consensus store v{}", self.config.version)
    }
}
