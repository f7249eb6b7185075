//! Vote accounting for the active consensus round

use std::collections::{HashMap, HashSet};
use tribft_chain::{ConsensusPhase, NodeId, QuorumCertificate, Vote};

/// Votes collected for the single active proposal, keyed by phase.
///
/// The first vote per (voter, phase) wins; later duplicates are dropped,
/// which is the double-vote prevention rule. The log is cleared on every
/// phase-machine reset (commit or timeout).
#[derive(Default)]
pub struct VoteLog {
    votes: HashMap<ConsensusPhase, Vec<Vote>>,
    voters: HashSet<(NodeId, ConsensusPhase)>,
}

impl VoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. Returns false when this (voter, phase) already voted.
    pub fn add(&mut self, vote: Vote) -> bool {
        let key = (vote.voter_id.clone(), vote.phase);
        if !self.voters.insert(key) {
            return false;
        }
        self.votes.entry(vote.phase).or_default().push(vote);
        true
    }

    /// Approving votes recorded for a phase.
    pub fn approvals(&self, phase: ConsensusPhase) -> usize {
        self.votes
            .get(&phase)
            .map(|v| v.iter().filter(|vote| vote.approve).count())
            .unwrap_or(0)
    }

    /// All votes recorded for a phase, in arrival order.
    pub fn votes_for(&self, phase: ConsensusPhase) -> &[Vote] {
        self.votes.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Assemble a certificate from the approving votes of a phase.
    pub fn build_qc(
        &self,
        proposal_id: &str,
        phase: ConsensusPhase,
        block_height: u64,
        view_number: u64,
        timestamp: f64,
    ) -> QuorumCertificate {
        let votes: Vec<Vote> = self
            .votes_for(phase)
            .iter()
            .filter(|v| v.approve)
            .cloned()
            .collect();
        QuorumCertificate {
            proposal_id: proposal_id.to_string(),
            phase,
            block_height,
            view_number,
            total_votes: votes.len(),
            votes,
            timestamp,
        }
    }

    pub fn clear(&mut self) {
        self.votes.clear();
        self.voters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(voter: &str, phase: ConsensusPhase, approve: bool) -> Vote {
        Vote {
            proposal_id: "p1".into(),
            voter_id: voter.into(),
            phase,
            approve,
            vote_time: 0.0,
            signature: format!("{voter}_p1"),
        }
    }

    #[test]
    fn first_vote_wins_per_voter_and_phase() {
        let mut log = VoteLog::new();
        assert!(log.add(vote("n1", ConsensusPhase::Prepare, true)));
        assert!(!log.add(vote("n1", ConsensusPhase::Prepare, false)));
        assert_eq!(log.approvals(ConsensusPhase::Prepare), 1);

        // Same voter may vote in a different phase.
        assert!(log.add(vote("n1", ConsensusPhase::PreCommit, true)));
    }

    #[test]
    fn rejections_are_recorded_but_not_counted() {
        let mut log = VoteLog::new();
        log.add(vote("n1", ConsensusPhase::Prepare, true));
        log.add(vote("n2", ConsensusPhase::Prepare, false));

        assert_eq!(log.approvals(ConsensusPhase::Prepare), 1);
        assert_eq!(log.votes_for(ConsensusPhase::Prepare).len(), 2);
    }

    #[test]
    fn qc_contains_only_approvals() {
        let mut log = VoteLog::new();
        log.add(vote("n1", ConsensusPhase::Commit, true));
        log.add(vote("n2", ConsensusPhase::Commit, false));
        log.add(vote("n3", ConsensusPhase::Commit, true));

        let qc = log.build_qc("p1", ConsensusPhase::Commit, 4, 1, 9.0);
        assert_eq!(qc.total_votes, 2);
        assert!(qc.votes.iter().all(|v| v.approve));
        assert!(qc.is_valid(2));
        assert_eq!(qc.block_height, 4);
    }

    #[test]
    fn clear_empties_everything() {
        let mut log = VoteLog::new();
        log.add(vote("n1", ConsensusPhase::Prepare, true));
        log.clear();
        assert_eq!(log.approvals(ConsensusPhase::Prepare), 0);
        assert!(log.add(vote("n1", ConsensusPhase::Prepare, true)));
    }
}
