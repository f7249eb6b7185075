//! Reputation tracker
//!
//! Thread-safe registry of per-node reputation records. The final score is
//! derived on every read from the dual (global, local) model; updates are
//! confined to `record_event` and `apply_decay`.

use crate::metrics::ReputationMetrics;
use crate::types::{ReputationConfig, ReputationEvent, ReputationRecord, TrustTier};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use tribft_chain::{Clock, NodeId};

/// Aggregate statistics over all tracked nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReputationStatistics {
    pub total_nodes: usize,
    pub average_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub trusted_nodes: usize,
}

#[derive(Clone)]
pub struct ReputationTracker {
    records: Arc<DashMap<NodeId, ReputationRecord>>,
    config: Arc<ReputationConfig>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<ReputationMetrics>>,
}

impl ReputationTracker {
    pub fn new(config: ReputationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            config: Arc::new(config),
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ReputationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Node management
    // ------------------------------------------------------------------

    /// Register a node with the given initial score (clamped to [0, 1]).
    /// Idempotent: an existing record is left untouched.
    pub fn register(&self, node_id: &str, initial_score: f64) {
        if self.records.contains_key(node_id) {
            debug!(node = node_id, "node already registered");
            return;
        }
        let record = ReputationRecord::new(node_id.to_string(), initial_score, self.clock.now());
        self.records.insert(node_id.to_string(), record);
        if let Some(m) = &self.metrics {
            m.total_nodes.set(self.records.len() as i64);
        }
        debug!(node = node_id, score = initial_score, "registered node");
    }

    /// Register with the configured default score.
    pub fn register_default(&self, node_id: &str) {
        self.register(node_id, self.config.initial_reputation);
    }

    /// Remove a node's record. Returns whether it existed.
    pub fn unregister(&self, node_id: &str) -> bool {
        let existed = self.records.remove(node_id).is_some();
        if existed {
            if let Some(m) = &self.metrics {
                m.total_nodes.set(self.records.len() as i64);
            }
            debug!(node = node_id, "unregistered node");
        }
        existed
    }

    pub fn is_registered(&self, node_id: &str) -> bool {
        self.records.contains_key(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.records.len()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Final reputation of a node; unknown nodes score the default.
    pub fn score(&self, node_id: &str) -> f64 {
        self.records
            .get(node_id)
            .map(|r| r.final_reputation(self.config.lambda))
            .unwrap_or(self.config.initial_reputation)
    }

    /// Snapshot of a node's record, if registered.
    pub fn record(&self, node_id: &str) -> Option<ReputationRecord> {
        self.records.get(node_id).map(|r| r.clone())
    }

    pub fn tier_of(&self, node_id: &str) -> TrustTier {
        self.records
            .get(node_id)
            .map(|r| r.tier(&self.config))
            .unwrap_or(TrustTier::Standard)
    }

    pub fn is_trusted(&self, node_id: &str) -> bool {
        self.tier_of(node_id) == TrustTier::Trusted
    }

    /// All trusted-tier node ids, sorted for deterministic consumption.
    pub fn trusted_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .records
            .iter()
            .filter(|r| r.tier(&self.config) == TrustTier::Trusted)
            .map(|r| r.key().clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// The `k` highest-scored registered nodes, ties broken by id.
    pub fn top_n(&self, k: usize) -> Vec<NodeId> {
        let mut scored: Vec<(NodeId, f64)> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.final_reputation(self.config.lambda)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        scored.into_iter().take(k).map(|(id, _)| id).collect()
    }

    pub fn statistics(&self) -> ReputationStatistics {
        let mut stats = ReputationStatistics::default();
        if self.records.is_empty() {
            return stats;
        }

        let mut sum = 0.0;
        stats.min_score = 1.0;
        for entry in self.records.iter() {
            let score = entry.final_reputation(self.config.lambda);
            sum += score;
            stats.min_score = stats.min_score.min(score);
            stats.max_score = stats.max_score.max(score);
            if entry.tier(&self.config) == TrustTier::Trusted {
                stats.trusted_nodes += 1;
            }
        }
        stats.total_nodes = self.records.len();
        stats.average_score = sum / stats.total_nodes as f64;

        if let Some(m) = &self.metrics {
            m.total_nodes.set(stats.total_nodes as i64);
            m.trusted_nodes.set(stats.trusted_nodes as i64);
            m.average_score.set(stats.average_score);
        }

        stats
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Apply an observed event to a node's reputation.
    ///
    /// Unknown nodes are auto-registered with the default score first.
    /// Positive deltas diminish with the node's current final reputation;
    /// negative deltas are fixed. The delta lands on the local performance
    /// component, clamped to [0, 1]; when the interaction count crosses the
    /// re-anchor threshold, R_g absorbs R_l.
    pub fn record_event(&self, node_id: &str, event: ReputationEvent) {
        let now = self.clock.now();
        let mut entry = self
            .records
            .entry(node_id.to_string())
            .or_insert_with(|| {
                ReputationRecord::new(node_id.to_string(), self.config.initial_reputation, now)
            });

        let current = entry.final_reputation(self.config.lambda);
        let magnitude = event.weight().effective(current);
        let delta = if event.is_positive() {
            magnitude
        } else {
            -magnitude
        };

        match event {
            ReputationEvent::ProposeValidBlock => {
                entry.valid_proposals += 1;
                entry.total_proposals += 1;
            }
            ReputationEvent::ProposeInvalidBlock => {
                entry.total_proposals += 1;
            }
            ReputationEvent::VoteCorrectly => {
                entry.correct_votes += 1;
                entry.total_votes += 1;
            }
            ReputationEvent::VoteIncorrectly | ReputationEvent::FailedVote => {
                entry.total_votes += 1;
            }
            ReputationEvent::SuccessfulTx => entry.successful_txs += 1,
            ReputationEvent::FailedTx => entry.failed_txs += 1,
            ReputationEvent::Timeout => entry.timeouts += 1,
            _ => {}
        }

        entry.local_performance = (entry.local_performance + delta).clamp(0.0, 1.0);
        entry.local_interactions += 1;
        if entry.local_interactions >= self.config.reanchor_threshold {
            entry.global_reputation = entry.local_performance;
            entry.local_interactions = 0;
        }

        entry.recent_events.push_back(event);
        while entry.recent_events.len() > self.config.max_recent_events {
            entry.recent_events.pop_front();
        }
        entry.last_update = now;

        if let Some(m) = &self.metrics {
            m.events_total.with_label_values(&[event.label()]).inc();
        }
        debug!(
            node = node_id,
            event = event.label(),
            delta,
            score = entry.final_reputation(self.config.lambda),
            "recorded reputation event"
        );
    }

    pub fn update_for_proposal(&self, proposer: &str, was_valid: bool) {
        let event = if was_valid {
            ReputationEvent::ProposeValidBlock
        } else {
            ReputationEvent::ProposeInvalidBlock
        };
        self.record_event(proposer, event);
    }

    pub fn update_for_vote(&self, voter: &str, was_correct: bool) {
        let event = if was_correct {
            ReputationEvent::VoteCorrectly
        } else {
            ReputationEvent::VoteIncorrectly
        };
        self.record_event(voter, event);
    }

    pub fn update_for_consensus_success(&self, participants: &[NodeId]) {
        for node in participants {
            self.record_event(node, ReputationEvent::SuccessfulConsensus);
        }
    }

    pub fn update_for_consensus_failure(&self, participants: &[NodeId]) {
        for node in participants {
            self.record_event(node, ReputationEvent::FailedConsensus);
        }
    }

    pub fn penalize_timeout(&self, node_id: &str) {
        self.record_event(node_id, ReputationEvent::Timeout);
    }

    pub fn penalize_malicious(&self, node_id: &str) {
        self.record_event(node_id, ReputationEvent::MaliciousBehavior);
    }

    /// Pull every score a step toward the initial value:
    /// `R ← R·(1−δ) + R₀·δ`, applied to both stored components so the
    /// derived final score moves the same way.
    pub fn apply_decay(&self) {
        let target = self.config.initial_reputation;
        let rate = self.config.decay_rate;
        let now = self.clock.now();

        for mut entry in self.records.iter_mut() {
            entry.global_reputation =
                (entry.global_reputation * (1.0 - rate) + target * rate).clamp(0.0, 1.0);
            entry.local_performance =
                (entry.local_performance * (1.0 - rate) + target * rate).clamp(0.0, 1.0);
            entry.last_update = now;
        }

        if let Some(m) = &self.metrics {
            m.decay_ticks.inc();
        }
        info!(nodes = self.records.len(), "applied reputation decay");
    }
}
