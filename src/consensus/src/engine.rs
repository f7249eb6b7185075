//! The HotStuff-style three-phase consensus engine

use crate::error::{ConsensusError, Result};
use crate::metrics::ConsensusMetrics;
use crate::state::VoteLog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tribft_chain::types::compute_block_hash;
use tribft_chain::{
    Block, BlockHeight, Clock, ConsensusPhase, NodeId, Proposal, QuorumCertificate, ShardId,
    Timestamp, Transaction, ViewNumber, Vote,
};

/// Capability interface toward the surrounding harness. The engine never
/// touches the network; it emits protocol events and the harness routes
/// them (broadcast within the shard, loopback for the emitter's own
/// votes).
pub trait ConsensusEmitter: Send + Sync {
    fn on_proposal(&self, proposal: &Proposal);
    fn on_vote(&self, vote: &Vote);
    fn on_phase_advance(&self, proposal_id: &str, from: ConsensusPhase, to: ConsensusPhase);
    fn on_commit(&self, block: &Block);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub node_id: NodeId,
    pub shard_id: ShardId,
    /// Seconds a round may run before it is abandoned
    pub consensus_timeout: f64,
}

impl ConsensusConfig {
    pub fn new(node_id: impl Into<NodeId>, shard_id: ShardId) -> Self {
        Self {
            node_id: node_id.into(),
            shard_id,
            consensus_timeout: 5.0,
        }
    }
}

/// Plain counters for round outcomes (prometheus metrics carry the same
/// data outward; these are for direct queries and tests).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    pub total_proposals: u64,
    pub committed_blocks: u64,
    pub failed_consensus: u64,
    pub total_transactions: u64,
    pub total_latency: f64,
    pub max_latency: f64,
}

impl RoundStats {
    pub fn avg_latency(&self) -> f64 {
        if self.committed_blocks == 0 {
            0.0
        } else {
            self.total_latency / self.committed_blocks as f64
        }
    }
}

pub struct HotStuffEngine {
    config: ConsensusConfig,

    phase: ConsensusPhase,
    view: ViewNumber,
    height: BlockHeight,
    previous_block_hash: String,

    /// Primary committee size, the quorum basis
    committee_size: usize,

    proposal: Option<Proposal>,
    round_start: Timestamp,
    votes: VoteLog,

    highest_qc: Option<QuorumCertificate>,
    phase_qcs: HashMap<ConsensusPhase, QuorumCertificate>,

    emitter: Arc<dyn ConsensusEmitter>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ConsensusMetrics>,
    stats: RoundStats,
}

impl HotStuffEngine {
    pub fn new(
        config: ConsensusConfig,
        emitter: Arc<dyn ConsensusEmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(node = %config.node_id, shard = config.shard_id, "consensus engine initialized");
        Self {
            config,
            phase: ConsensusPhase::Idle,
            view: 0,
            height: 0,
            previous_block_hash: String::new(),
            committee_size: 0,
            proposal: None,
            round_start: 0.0,
            votes: VoteLog::new(),
            highest_qc: None,
            phase_qcs: HashMap::new(),
            emitter,
            clock,
            metrics: Arc::new(ConsensusMetrics::new()),
            stats: RoundStats::default(),
        }
    }

    /// Update the quorum basis when the committee rotates.
    pub fn set_committee_size(&mut self, primary_count: usize) {
        self.committee_size = primary_count;
    }

    pub fn quorum_size(&self) -> usize {
        crate::quorum_size(self.committee_size)
    }

    // ------------------------------------------------------------------
    // Leader interface
    // ------------------------------------------------------------------

    pub fn can_propose(&self) -> bool {
        self.phase == ConsensusPhase::Idle && self.proposal.is_none()
    }

    /// Publish a proposal for the next height. Leader only; refuses while
    /// a round is active or with an empty batch.
    pub fn propose_block(&mut self, transactions: Vec<Transaction>) -> bool {
        if !self.can_propose() {
            debug!(node = %self.config.node_id, "cannot propose: round in progress");
            return false;
        }
        if transactions.is_empty() {
            debug!(node = %self.config.node_id, "cannot propose: empty batch");
            return false;
        }

        let now = self.clock.now();
        let height = self.height + 1;
        let proposal = Proposal {
            proposal_id: format!("{}_{}_{}_{:.6}", self.config.node_id, self.view, height, now),
            block_height: height,
            view_number: self.view,
            leader_id: self.config.node_id.clone(),
            shard_id: self.config.shard_id,
            proposal_time: now,
            block_hash: compute_block_hash(height, &self.previous_block_hash, now),
            transactions,
        };

        info!(
            node = %self.config.node_id,
            height,
            txs = proposal.transactions.len(),
            "proposing block"
        );

        self.proposal = Some(proposal.clone());
        self.phase = ConsensusPhase::Prepare;
        self.round_start = now;
        self.stats.total_proposals += 1;
        self.metrics.proposals_sent.inc();

        self.emitter.on_proposal(&proposal);
        self.send_vote(&proposal, ConsensusPhase::Prepare, true);
        true
    }

    // ------------------------------------------------------------------
    // Replica interface
    // ------------------------------------------------------------------

    /// Validate and adopt an incoming proposal, voting Prepare either way:
    /// approve on success, reject on any validation failure (wrong-height
    /// proposals are rejected, never silently dropped).
    pub fn handle_proposal(&mut self, proposal: &Proposal) {
        if let Some(active) = &self.proposal {
            if active.proposal_id == proposal.proposal_id {
                // Our own broadcast echoed back.
                return;
            }
        }

        if let Err(err) = self.validate_proposal(proposal) {
            warn!(
                node = %self.config.node_id,
                proposal = %proposal.proposal_id,
                %err,
                "rejecting proposal"
            );
            self.metrics.proposals_rejected.inc();
            self.send_vote(proposal, ConsensusPhase::Prepare, false);
            return;
        }

        debug!(
            node = %self.config.node_id,
            proposal = %proposal.proposal_id,
            height = proposal.block_height,
            "accepted proposal"
        );
        self.proposal = Some(proposal.clone());
        self.phase = ConsensusPhase::Prepare;
        self.round_start = self.clock.now();
        if proposal.view_number > self.view {
            self.view = proposal.view_number;
            self.metrics.current_view.set(self.view as i64);
        }
        self.send_vote(proposal, ConsensusPhase::Prepare, true);
    }

    /// Accumulate a vote; a quorum of approvals for the current phase
    /// advances the round. Late votes are recorded without re-transition,
    /// votes for unknown proposals are ignored.
    pub fn handle_vote(&mut self, vote: &Vote) {
        let Some(active) = &self.proposal else {
            debug!(node = %self.config.node_id, "vote without active proposal ignored");
            return;
        };
        if vote.proposal_id != active.proposal_id {
            debug!(
                node = %self.config.node_id,
                got = %vote.proposal_id,
                "vote for unknown proposal ignored"
            );
            return;
        }

        if !self.votes.add(vote.clone()) {
            debug!(node = %self.config.node_id, voter = %vote.voter_id, "duplicate vote dropped");
            return;
        }
        self.metrics.votes_received.inc();

        if vote.phase == self.phase {
            if self.votes.approvals(self.phase) >= self.quorum_size() {
                self.advance_phase();
            }
        } else if vote.phase < self.phase {
            debug!(
                node = %self.config.node_id,
                phase = ?vote.phase,
                current = ?self.phase,
                "late vote recorded"
            );
        }
        // Future-phase votes stay recorded and count once we get there.
    }

    /// Follower path: the leader reached a quorum and broadcast the
    /// transition. Only the legal successor of our current phase on the
    /// active proposal is honored.
    pub fn handle_phase_advance(&mut self, proposal_id: &str, to: ConsensusPhase) {
        let Some(active) = &self.proposal else {
            return;
        };
        if active.proposal_id != proposal_id {
            debug!(node = %self.config.node_id, "phase advance for different proposal ignored");
            return;
        }
        let Some(expected) = self.phase.successor() else {
            return;
        };
        if to != expected {
            debug!(
                node = %self.config.node_id,
                current = ?self.phase,
                ?to,
                "unexpected phase transition ignored"
            );
            return;
        }

        debug!(node = %self.config.node_id, ?to, "follower advancing phase");
        self.phase = to;
        let proposal = active.clone();
        self.send_vote(&proposal, to, true);

        // Votes for this phase may already be buffered from faster peers.
        if self.votes.approvals(self.phase) >= self.quorum_size() {
            self.advance_phase();
        }
    }

    /// Abandon the active round (timer expiry). Leaders may re-propose in
    /// the next round.
    pub fn handle_timeout(&mut self) {
        if self.proposal.is_none() {
            return;
        }
        warn!(
            node = %self.config.node_id,
            phase = ?self.phase,
            "consensus timeout, abandoning round"
        );
        self.stats.failed_consensus += 1;
        self.metrics.timeouts.inc();
        self.reset_round();
    }

    /// Whether the active round has outlived the configured timeout.
    pub fn deadline_exceeded(&self) -> bool {
        self.proposal.is_some()
            && self.clock.now() - self.round_start > self.config.consensus_timeout
    }

    /// Timer driver: abandon the round iff its deadline passed.
    pub fn tick(&mut self) -> bool {
        if self.deadline_exceeded() {
            self.handle_timeout();
            true
        } else {
            false
        }
    }

    /// A leadership change cancels an in-flight round the ex-leader was
    /// driving and opens a new view.
    pub fn handle_leader_change(&mut self, new_leader: &str) {
        self.view += 1;
        self.metrics.current_view.set(self.view as i64);
        self.metrics.view_changes.inc();

        if let Some(active) = &self.proposal {
            if active.leader_id != new_leader {
                warn!(
                    node = %self.config.node_id,
                    old_leader = %active.leader_id,
                    new_leader,
                    "leader changed mid-round, cancelling"
                );
                self.stats.failed_consensus += 1;
                self.reset_round();
            }
        }
    }

    /// Migrate the engine to a new shard (the node was re-homed). Any
    /// active round is abandoned; rounds do not cross shard boundaries.
    pub fn set_shard(&mut self, shard_id: ShardId) {
        if self.config.shard_id == shard_id {
            return;
        }
        if self.proposal.is_some() {
            warn!(
                node = %self.config.node_id,
                from = self.config.shard_id,
                to = shard_id,
                "shard changed mid-round, cancelling"
            );
            self.stats.failed_consensus += 1;
            self.reset_round();
        }
        self.config.shard_id = shard_id;
    }

    /// Fast-forward after a trusted peer reported a higher chain.
    pub fn sync_to_height(&mut self, height: BlockHeight) {
        if height > self.height {
            info!(node = %self.config.node_id, from = self.height, to = height, "syncing height");
            self.height = height;
            self.metrics.current_height.set(height as i64);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn current_phase(&self) -> ConsensusPhase {
        self.phase
    }

    pub fn current_view(&self) -> ViewNumber {
        self.view
    }

    pub fn current_height(&self) -> BlockHeight {
        self.height
    }

    pub fn highest_qc(&self) -> Option<&QuorumCertificate> {
        self.highest_qc.as_ref()
    }

    pub fn is_in_progress(&self) -> bool {
        self.proposal.is_some() && self.phase != ConsensusPhase::Idle
    }

    pub fn current_proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    pub fn previous_block_hash(&self) -> &str {
        &self.previous_block_hash
    }

    pub fn stats(&self) -> &RoundStats {
        &self.stats
    }

    pub fn metrics(&self) -> Arc<ConsensusMetrics> {
        self.metrics.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate_proposal(&self, proposal: &Proposal) -> Result<()> {
        if self.proposal.is_some() {
            return Err(ConsensusError::AlreadyInProgress);
        }
        if proposal.proposal_id.is_empty() || proposal.block_hash.is_empty() {
            return Err(ConsensusError::InvalidProposal(
                "empty proposal id or block hash".into(),
            ));
        }
        if proposal.block_height != self.height + 1 {
            return Err(ConsensusError::InvalidHeight {
                expected: self.height + 1,
                actual: proposal.block_height,
            });
        }
        if proposal.view_number < self.view {
            return Err(ConsensusError::StaleView {
                current: self.view,
                actual: proposal.view_number,
            });
        }
        if proposal.shard_id != self.config.shard_id {
            return Err(ConsensusError::WrongShard {
                expected: self.config.shard_id,
                actual: proposal.shard_id,
            });
        }
        if proposal.transactions.is_empty() {
            return Err(ConsensusError::EmptyBatch);
        }
        for tx in &proposal.transactions {
            if !tx.is_well_formed() {
                return Err(ConsensusError::InvalidProposal(format!(
                    "malformed transaction '{}'",
                    tx.id
                )));
            }
        }
        Ok(())
    }

    fn send_vote(&mut self, proposal: &Proposal, phase: ConsensusPhase, approve: bool) {
        let vote = Vote {
            proposal_id: proposal.proposal_id.clone(),
            voter_id: self.config.node_id.clone(),
            phase,
            approve,
            vote_time: self.clock.now(),
            signature: format!("{}_{}", self.config.node_id, proposal.proposal_id),
        };
        self.metrics.votes_sent.inc();
        // Votes route through the harness and come back via handle_vote,
        // so own votes and peer votes are counted identically.
        self.emitter.on_vote(&vote);
    }

    /// The current phase reached its quorum: certify it and either move
    /// to the next phase or commit.
    fn advance_phase(&mut self) {
        let phase = self.phase;
        let proposal = self
            .proposal
            .clone()
            .expect("advance_phase requires an active proposal");

        let qc = self.votes.build_qc(
            &proposal.proposal_id,
            phase,
            proposal.block_height,
            self.view,
            self.clock.now(),
        );
        self.highest_qc = Some(qc.clone());
        self.phase_qcs.insert(phase, qc);

        debug!(
            node = %self.config.node_id,
            ?phase,
            proposal = %proposal.proposal_id,
            "quorum reached"
        );

        if phase == ConsensusPhase::Commit {
            self.commit_block();
            return;
        }

        let next = phase
            .successor()
            .expect("prepare and pre-commit have successors");
        self.emitter
            .on_phase_advance(&proposal.proposal_id, phase, next);
        self.phase = next;
        self.send_vote(&proposal, next, true);

        // Early votes for the new phase may already satisfy the quorum.
        if self.votes.approvals(self.phase) >= self.quorum_size() {
            self.advance_phase();
        }
    }

    /// The single atomic point where a block becomes canonical.
    fn commit_block(&mut self) {
        let proposal = self
            .proposal
            .take()
            .expect("commit requires an active proposal");
        let now = self.clock.now();

        let qc = self
            .phase_qcs
            .get(&ConsensusPhase::Commit)
            .cloned()
            .unwrap_or_default();
        let block = Block {
            height: proposal.block_height,
            block_hash: proposal.block_hash.clone(),
            previous_hash: self.previous_block_hash.clone(),
            shard_id: proposal.shard_id,
            transactions: proposal.transactions.clone(),
            qc,
            timestamp: now,
            proposer: proposal.leader_id.clone(),
        };

        self.height = proposal.block_height;
        self.previous_block_hash = proposal.block_hash.clone();

        let latency = now - self.round_start;
        self.stats.committed_blocks += 1;
        self.stats.total_transactions += block.transactions.len() as u64;
        self.stats.total_latency += latency;
        self.stats.max_latency = self.stats.max_latency.max(latency);
        self.metrics.blocks_committed.inc();
        self.metrics.current_height.set(self.height as i64);
        self.metrics.commit_latency.observe(latency);

        info!(
            node = %self.config.node_id,
            height = block.height,
            txs = block.transactions.len(),
            latency,
            "block committed"
        );

        self.emitter.on_commit(&block);
        self.reset_round();
    }

    fn reset_round(&mut self) {
        self.phase = ConsensusPhase::Idle;
        self.proposal = None;
        self.votes.clear();
        self.phase_qcs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tribft_chain::SimClock;

    /// Emitter that records every event for assertions.
    #[derive(Default)]
    struct RecordingEmitter {
        proposals: Mutex<Vec<Proposal>>,
        votes: Mutex<Vec<Vote>>,
        advances: Mutex<Vec<(String, ConsensusPhase, ConsensusPhase)>>,
        commits: Mutex<Vec<Block>>,
    }

    impl ConsensusEmitter for RecordingEmitter {
        fn on_proposal(&self, proposal: &Proposal) {
            self.proposals.lock().push(proposal.clone());
        }
        fn on_vote(&self, vote: &Vote) {
            self.votes.lock().push(vote.clone());
        }
        fn on_phase_advance(&self, proposal_id: &str, from: ConsensusPhase, to: ConsensusPhase) {
            self.advances.lock().push((proposal_id.into(), from, to));
        }
        fn on_commit(&self, block: &Block) {
            self.commits.lock().push(block.clone());
        }
    }

    fn engine(node: &str) -> (HotStuffEngine, Arc<RecordingEmitter>, Arc<SimClock>) {
        let emitter = Arc::new(RecordingEmitter::default());
        let clock = SimClock::new();
        let mut engine = HotStuffEngine::new(
            ConsensusConfig::new(node, 0),
            emitter.clone(),
            clock.clone(),
        );
        engine.set_committee_size(3);
        (engine, emitter, clock)
    }

    fn tx(id: &str) -> Transaction {
        Transaction::new(id, "sender", 0.0)
    }

    fn peer_vote(proposal: &Proposal, voter: &str, phase: ConsensusPhase) -> Vote {
        Vote {
            proposal_id: proposal.proposal_id.clone(),
            voter_id: voter.into(),
            phase,
            approve: true,
            vote_time: 0.0,
            signature: format!("{voter}_{}", proposal.proposal_id),
        }
    }

    #[test]
    fn propose_requires_idle_and_transactions() {
        let (mut engine, _, _) = engine("leader");
        assert!(!engine.propose_block(vec![]));
        assert!(engine.propose_block(vec![tx("t1")]));
        assert!(engine.is_in_progress());
        // Second proposal while in progress is refused.
        assert!(!engine.propose_block(vec![tx("t2")]));
    }

    #[test]
    fn proposal_carries_deterministic_hash_and_next_height() {
        let (mut engine, emitter, _) = engine("leader");
        engine.propose_block(vec![tx("t1")]);
        let proposal = emitter.proposals.lock()[0].clone();
        assert_eq!(proposal.block_height, 1);
        assert_eq!(
            proposal.block_hash,
            compute_block_hash(1, "", proposal.proposal_time)
        );
    }

    #[test]
    fn invalid_height_draws_reject_vote() {
        let (mut engine, emitter, _) = engine("replica");
        let bogus = Proposal {
            proposal_id: "p".into(),
            block_height: 7,
            view_number: 0,
            leader_id: "leader".into(),
            shard_id: 0,
            proposal_time: 0.0,
            transactions: vec![tx("t1")],
            block_hash: "h".into(),
        };
        engine.handle_proposal(&bogus);

        let votes = emitter.votes.lock();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].approve);
        assert!(!engine.is_in_progress());
    }

    #[test]
    fn wrong_shard_is_rejected() {
        let (mut engine, emitter, _) = engine("replica");
        let foreign = Proposal {
            proposal_id: "p".into(),
            block_height: 1,
            view_number: 0,
            leader_id: "leader".into(),
            shard_id: 9,
            proposal_time: 0.0,
            transactions: vec![tx("t1")],
            block_hash: "h".into(),
        };
        engine.handle_proposal(&foreign);
        assert!(!emitter.votes.lock()[0].approve);
    }

    #[test]
    fn valid_proposal_is_adopted_with_approve_vote() {
        let (mut engine, emitter, _) = engine("replica");
        let proposal = Proposal {
            proposal_id: "p".into(),
            block_height: 1,
            view_number: 0,
            leader_id: "leader".into(),
            shard_id: 0,
            proposal_time: 0.5,
            transactions: vec![tx("t1"), tx("t2")],
            block_hash: "h".into(),
        };
        engine.handle_proposal(&proposal);

        assert_eq!(engine.current_phase(), ConsensusPhase::Prepare);
        assert!(engine.is_in_progress());
        let votes = emitter.votes.lock();
        assert!(votes[0].approve);
        assert_eq!(votes[0].phase, ConsensusPhase::Prepare);
    }

    #[test]
    fn quorum_of_votes_walks_all_three_phases_to_commit() {
        let (mut engine, emitter, _) = engine("leader");
        engine.propose_block(vec![tx("t1"), tx("t2")]);
        let proposal = emitter.proposals.lock()[0].clone();

        for phase in [
            ConsensusPhase::Prepare,
            ConsensusPhase::PreCommit,
            ConsensusPhase::Commit,
        ] {
            // Own vote loops back plus two peers = quorum of 3.
            let own = peer_vote(&proposal, "leader", phase);
            engine.handle_vote(&own);
            engine.handle_vote(&peer_vote(&proposal, "b", phase));
            engine.handle_vote(&peer_vote(&proposal, "c", phase));
        }

        assert_eq!(engine.current_height(), 1);
        assert_eq!(engine.current_phase(), ConsensusPhase::Idle);
        assert!(!engine.is_in_progress());

        let commits = emitter.commits.lock();
        assert_eq!(commits.len(), 1);
        let block = &commits[0];
        assert_eq!(block.height, 1);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.qc.phase, ConsensusPhase::Commit);
        assert!(block.qc.is_valid(engine.quorum_size()));

        // Hash chain advanced.
        assert_eq!(engine.previous_block_hash(), block.block_hash);
        assert_eq!(engine.stats().committed_blocks, 1);
    }

    #[test]
    fn duplicate_votes_do_not_count_toward_quorum() {
        let (mut engine, emitter, _) = engine("leader");
        engine.propose_block(vec![tx("t1")]);
        let proposal = emitter.proposals.lock()[0].clone();

        let vote = peer_vote(&proposal, "b", ConsensusPhase::Prepare);
        engine.handle_vote(&vote);
        engine.handle_vote(&vote);
        engine.handle_vote(&vote);

        assert_eq!(engine.current_phase(), ConsensusPhase::Prepare);
    }

    #[test]
    fn votes_for_unknown_proposals_are_ignored() {
        let (mut engine, _, _) = engine("leader");
        engine.propose_block(vec![tx("t1")]);
        let stray = Vote {
            proposal_id: "other".into(),
            voter_id: "b".into(),
            phase: ConsensusPhase::Prepare,
            approve: true,
            vote_time: 0.0,
            signature: "b_other".into(),
        };
        engine.handle_vote(&stray);
        assert_eq!(engine.current_phase(), ConsensusPhase::Prepare);
    }

    #[test]
    fn phase_advance_only_accepts_legal_successor() {
        let (mut engine, emitter, _) = engine("replica");
        let proposal = Proposal {
            proposal_id: "p".into(),
            block_height: 1,
            view_number: 0,
            leader_id: "leader".into(),
            shard_id: 0,
            proposal_time: 0.0,
            transactions: vec![tx("t1")],
            block_hash: "h".into(),
        };
        engine.handle_proposal(&proposal);
        assert_eq!(engine.current_phase(), ConsensusPhase::Prepare);

        // Jumping straight to Commit is illegal from Prepare.
        engine.handle_phase_advance("p", ConsensusPhase::Commit);
        assert_eq!(engine.current_phase(), ConsensusPhase::Prepare);

        engine.handle_phase_advance("p", ConsensusPhase::PreCommit);
        assert_eq!(engine.current_phase(), ConsensusPhase::PreCommit);

        // The follower votes for the phase it advanced into.
        let votes = emitter.votes.lock();
        assert_eq!(votes.last().unwrap().phase, ConsensusPhase::PreCommit);
    }

    #[test]
    fn timeout_resets_to_idle_and_counts_failure() {
        let (mut engine, _, clock) = engine("leader");
        engine.propose_block(vec![tx("t1")]);
        assert!(!engine.tick(), "deadline not reached yet");

        clock.advance(5.1);
        assert!(engine.deadline_exceeded());
        assert!(engine.tick());

        assert_eq!(engine.current_phase(), ConsensusPhase::Idle);
        assert!(!engine.is_in_progress());
        assert_eq!(engine.stats().failed_consensus, 1);
        // Leader may propose again in the next round.
        assert!(engine.propose_block(vec![tx("t2")]));
    }

    #[test]
    fn leader_change_cancels_foreign_round_and_bumps_view() {
        let (mut engine, _, _) = engine("replica");
        let proposal = Proposal {
            proposal_id: "p".into(),
            block_height: 1,
            view_number: 0,
            leader_id: "old-leader".into(),
            shard_id: 0,
            proposal_time: 0.0,
            transactions: vec![tx("t1")],
            block_hash: "h".into(),
        };
        engine.handle_proposal(&proposal);
        assert!(engine.is_in_progress());

        engine.handle_leader_change("new-leader");
        assert!(!engine.is_in_progress());
        assert_eq!(engine.current_view(), 1);
        assert_eq!(engine.stats().failed_consensus, 1);
    }

    #[test]
    fn sync_to_height_is_monotonic() {
        let (mut engine, _, _) = engine("n");
        engine.sync_to_height(5);
        assert_eq!(engine.current_height(), 5);
        engine.sync_to_height(3);
        assert_eq!(engine.current_height(), 5);
    }

    #[test]
    fn stale_view_proposal_is_rejected_after_view_change() {
        let (mut engine, emitter, _) = engine("replica");
        engine.handle_leader_change("new-leader");
        assert_eq!(engine.current_view(), 1);

        let stale = Proposal {
            proposal_id: "p".into(),
            block_height: 1,
            view_number: 0,
            leader_id: "old-leader".into(),
            shard_id: 0,
            proposal_time: 0.0,
            transactions: vec![tx("t1")],
            block_hash: "h".into(),
        };
        engine.handle_proposal(&stale);
        assert!(!emitter.votes.lock()[0].approve);
    }
}
