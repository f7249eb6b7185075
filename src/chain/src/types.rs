//! Transactions, proposals, votes, certificates, blocks and headers

use crate::merkle;
use crate::{BlockHeight, NodeId, ShardId, Timestamp, ViewNumber, NO_SHARD};
use serde::{Deserialize, Serialize};

/// An application transaction. The payload is opaque to consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction id
    pub id: String,

    /// Submitting node
    pub sender: NodeId,

    /// Destination node (may be empty for broadcast-style payloads)
    pub receiver: NodeId,

    /// Numeric value carried by the transaction
    pub value: f64,

    /// Submission time (simulation seconds)
    pub timestamp: Timestamp,

    /// Free-form payload
    pub data: String,
}

impl Transaction {
    pub fn new(id: impl Into<String>, sender: impl Into<NodeId>, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            receiver: String::new(),
            value: 0.0,
            timestamp,
            data: String::new(),
        }
    }

    /// A transaction is well-formed iff its id and sender are non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty() && !self.sender.is_empty()
    }
}

/// Phase of the three-phase agreement protocol.
///
/// Ordering follows protocol progress, so `phase < current_phase` identifies
/// a late vote.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ConsensusPhase {
    Idle,
    Prepare,
    PreCommit,
    Commit,
}

impl ConsensusPhase {
    /// The legal next phase, or `None` when the round terminates.
    pub fn successor(self) -> Option<ConsensusPhase> {
        match self {
            ConsensusPhase::Idle => None,
            ConsensusPhase::Prepare => Some(ConsensusPhase::PreCommit),
            ConsensusPhase::PreCommit => Some(ConsensusPhase::Commit),
            ConsensusPhase::Commit => None,
        }
    }
}

/// A leader's block proposal for one consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub block_height: BlockHeight,
    pub view_number: ViewNumber,
    pub leader_id: NodeId,
    pub shard_id: ShardId,
    pub proposal_time: Timestamp,
    pub transactions: Vec<Transaction>,
    pub block_hash: String,
}

/// Deterministic block hash over (height, previous hash, proposal time).
///
/// Every replica can recompute it from the proposal fields alone.
pub fn compute_block_hash(
    height: BlockHeight,
    previous_hash: &str,
    proposal_time: Timestamp,
) -> String {
    crate::digest_hex(&[
        &height.to_string(),
        previous_hash,
        &format!("{proposal_time:.6}"),
    ])
}

/// A single committee member's vote on a proposal at one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: String,
    pub voter_id: NodeId,
    pub phase: ConsensusPhase,
    pub approve: bool,
    pub vote_time: Timestamp,
    /// Opaque signature string; real signature schemes are out of scope
    pub signature: String,
}

/// Proof that a quorum of the committee agreed on (proposal, phase).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    pub proposal_id: String,
    pub phase: ConsensusPhase,
    pub block_height: BlockHeight,
    pub view_number: ViewNumber,
    pub votes: Vec<Vote>,
    pub total_votes: usize,
    pub timestamp: Timestamp,
}

impl Default for ConsensusPhase {
    fn default() -> Self {
        ConsensusPhase::Idle
    }
}

impl QuorumCertificate {
    /// A certificate is valid iff it carries at least `quorum_size` votes
    /// and every vote references the same (proposal, phase).
    pub fn is_valid(&self, quorum_size: usize) -> bool {
        self.total_votes >= quorum_size
            && self.votes.len() == self.total_votes
            && self
                .votes
                .iter()
                .all(|v| v.proposal_id == self.proposal_id && v.phase == self.phase)
    }
}

/// A committed block. Committed blocks are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub block_hash: String,
    pub previous_hash: String,
    pub shard_id: ShardId,
    pub transactions: Vec<Transaction>,
    /// The terminating Commit-phase certificate
    pub qc: QuorumCertificate,
    pub timestamp: Timestamp,
    pub proposer: NodeId,
}

/// A block stripped of its transaction list, for lightweight sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: BlockHeight,
    pub block_hash: String,
    pub previous_hash: String,
    /// Merkle root over the block's transaction ids
    pub merkle_root: String,
    pub shard_id: ShardId,
    pub timestamp: Timestamp,
    pub proposer: NodeId,
    pub tx_count: usize,
}

impl BlockHeader {
    /// Extract the lightweight header from a full block.
    pub fn from_block(block: &Block) -> Self {
        let tx_ids: Vec<String> = block.transactions.iter().map(|t| t.id.clone()).collect();
        Self {
            height: block.height,
            block_hash: block.block_hash.clone(),
            previous_hash: block.previous_hash.clone(),
            merkle_root: merkle::merkle_root(&tx_ids),
            shard_id: block.shard_id,
            timestamp: block.timestamp,
            proposer: block.proposer.clone(),
            tx_count: block.transactions.len(),
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self {
            height: 0,
            block_hash: String::new(),
            previous_hash: String::new(),
            shard_id: NO_SHARD,
            transactions: Vec::new(),
            qc: QuorumCertificate::default(),
            timestamp: 0.0,
            proposer: String::new(),
        }
    }
}
