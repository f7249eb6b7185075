//! Wire-level consensus messages
//!
//! Consensus, sync and data-plane traffic are distinct logical messages;
//! the node harness encodes this enum onto the transport. The inner
//! payload types live in `tribft-chain` since they double as the
//! persistent data model.

use serde::{Deserialize, Serialize};
use tribft_chain::{Block, BlockHeader, BlockHeight, ConsensusPhase, Proposal, Transaction, Vote};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    /// Leader publishes a block proposal to its shard
    Proposal(Proposal),

    /// Committee member's vote for (proposal, phase)
    Vote(Vote),

    /// Leader-driven phase synchronization after a quorum
    PhaseAdvance {
        proposal_id: String,
        from: ConsensusPhase,
        to: ConsensusPhase,
    },

    /// Application transaction gossip toward the shard leader
    Submit(Transaction),

    /// Leader assigns trusted verifiers to a low-reputation report
    VerificationAssign {
        event_id: String,
        tx: Transaction,
        verifiers: Vec<String>,
    },

    /// A verifier's verdict on a pending low-reputation report
    VerificationVote {
        event_id: String,
        verifier_id: String,
        confirm: bool,
    },

    /// Committed block header, for lightweight sync
    HeaderAnnounce(BlockHeader),

    /// Non-committee node requests a full block
    BlockRequest {
        request_id: String,
        height: BlockHeight,
    },

    /// Full block served to a requester
    BlockResponse(Block),
}
