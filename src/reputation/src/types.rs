//! Reputation events, weights, configuration and per-node records

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tribft_chain::{NodeId, Timestamp};

/// Protocol-observed behavior that moves a node's reputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReputationEvent {
    SuccessfulTx,
    FailedTx,
    SuccessfulVote,
    FailedVote,
    Timeout,
    MaliciousBehavior,
    ProposeValidBlock,
    ProposeInvalidBlock,
    VoteCorrectly,
    VoteIncorrectly,
    SuccessfulConsensus,
    FailedConsensus,
}

impl ReputationEvent {
    /// Base weight and marginal-decay flag for this event.
    ///
    /// Positive events reward `β/(1+R)`; negative events penalize a fixed
    /// `γ`. Weights follow the evaluation table this system is built
    /// around.
    pub fn weight(self) -> EventWeight {
        match self {
            ReputationEvent::SuccessfulTx
            | ReputationEvent::SuccessfulVote
            | ReputationEvent::ProposeValidBlock
            | ReputationEvent::VoteCorrectly
            | ReputationEvent::SuccessfulConsensus => EventWeight::positive(0.05),

            ReputationEvent::ProposeInvalidBlock => EventWeight::negative(0.08),

            ReputationEvent::VoteIncorrectly
            | ReputationEvent::FailedVote
            | ReputationEvent::Timeout
            | ReputationEvent::FailedConsensus
            | ReputationEvent::FailedTx => EventWeight::negative(0.05),

            ReputationEvent::MaliciousBehavior => EventWeight::negative(0.20),
        }
    }

    pub fn is_positive(self) -> bool {
        self.weight().marginal_decay
    }

    /// Stable label for metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            ReputationEvent::SuccessfulTx => "successful_tx",
            ReputationEvent::FailedTx => "failed_tx",
            ReputationEvent::SuccessfulVote => "successful_vote",
            ReputationEvent::FailedVote => "failed_vote",
            ReputationEvent::Timeout => "timeout",
            ReputationEvent::MaliciousBehavior => "malicious_behavior",
            ReputationEvent::ProposeValidBlock => "propose_valid_block",
            ReputationEvent::ProposeInvalidBlock => "propose_invalid_block",
            ReputationEvent::VoteCorrectly => "vote_correctly",
            ReputationEvent::VoteIncorrectly => "vote_incorrectly",
            ReputationEvent::SuccessfulConsensus => "successful_consensus",
            ReputationEvent::FailedConsensus => "failed_consensus",
        }
    }
}

/// Event weight with the marginal-diminishing rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventWeight {
    /// β for positive events, γ for negative ones
    pub base_weight: f64,
    /// Positive events decay with the node's current reputation
    pub marginal_decay: bool,
}

impl EventWeight {
    pub fn positive(beta: f64) -> Self {
        Self {
            base_weight: beta,
            marginal_decay: true,
        }
    }

    pub fn negative(gamma: f64) -> Self {
        Self {
            base_weight: gamma,
            marginal_decay: false,
        }
    }

    /// Applied magnitude at the node's current reputation:
    /// `β/(1+R)` when marginal, `γ` otherwise.
    pub fn effective(&self, current_reputation: f64) -> f64 {
        if self.marginal_decay {
            self.base_weight / (1.0 + current_reputation)
        } else {
            self.base_weight
        }
    }
}

/// Trust tier derived from the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustTier {
    /// R ≥ 0.8 — eligible for committees and cross-verification duty
    Trusted,
    /// 0.2 ≤ R < 0.8
    Standard,
    /// R < 0.2 — reports require cross-verification
    Candidate,
}

/// Configuration for the reputation tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Score assigned to newly registered nodes (default 0.5)
    pub initial_reputation: f64,

    /// Per-tick pull toward the initial score (default 0.01)
    pub decay_rate: f64,

    /// λ in `w = exp(−λ·N_l)` (default 0.1)
    pub lambda: f64,

    /// Local interactions before R_g re-anchors to R_l (default 100)
    pub reanchor_threshold: u32,

    /// Recent-event queue cap per record (default 100)
    pub max_recent_events: usize,

    /// Trusted tier threshold (default 0.8)
    pub trusted_threshold: f64,

    /// Standard tier lower bound (default 0.2)
    pub standard_threshold: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            initial_reputation: 0.5,
            decay_rate: 0.01,
            lambda: 0.1,
            reanchor_threshold: 100,
            max_recent_events: 100,
            trusted_threshold: 0.8,
            standard_threshold: 0.2,
        }
    }
}

/// Per-node reputation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub node_id: NodeId,

    /// R_g: cross-epoch long-term reputation
    pub global_reputation: f64,

    /// R_l: local instant performance
    pub local_performance: f64,

    /// N_l: local interaction count since the last re-anchor
    pub local_interactions: u32,

    pub valid_proposals: u32,
    pub total_proposals: u32,
    pub correct_votes: u32,
    pub total_votes: u32,
    pub successful_txs: u32,
    pub failed_txs: u32,
    pub timeouts: u32,

    pub last_update: Timestamp,

    /// Bounded queue of recent events, newest last
    pub recent_events: VecDeque<ReputationEvent>,
}

impl ReputationRecord {
    pub fn new(node_id: NodeId, initial: f64, now: Timestamp) -> Self {
        let initial = initial.clamp(0.0, 1.0);
        Self {
            node_id,
            global_reputation: initial,
            local_performance: initial,
            local_interactions: 0,
            valid_proposals: 0,
            total_proposals: 0,
            correct_votes: 0,
            total_votes: 0,
            successful_txs: 0,
            failed_txs: 0,
            timeouts: 0,
            last_update: now,
            recent_events: VecDeque::new(),
        }
    }

    /// Final reputation `w·R_g + (1−w)·R_l` with `w = exp(−λ·N_l)`.
    ///
    /// Always derived on demand; never cached.
    pub fn final_reputation(&self, lambda: f64) -> f64 {
        let w = (-lambda * f64::from(self.local_interactions)).exp();
        w * self.global_reputation + (1.0 - w) * self.local_performance
    }

    pub fn tier(&self, config: &ReputationConfig) -> TrustTier {
        let r = self.final_reputation(config.lambda);
        if r >= config.trusted_threshold {
            TrustTier::Trusted
        } else if r >= config.standard_threshold {
            TrustTier::Standard
        } else {
            TrustTier::Candidate
        }
    }
}
