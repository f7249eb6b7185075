//! Error types for consensus operations

use thiserror::Error;
use tribft_chain::{BlockHeight, ShardId, ViewNumber};

pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("Consensus round already in progress")]
    AlreadyInProgress,

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Invalid height: expected {expected}, got {actual}")]
    InvalidHeight {
        expected: BlockHeight,
        actual: BlockHeight,
    },

    #[error("Stale view: current {current}, got {actual}")]
    StaleView {
        current: ViewNumber,
        actual: ViewNumber,
    },

    #[error("Wrong shard: expected {expected}, got {actual}")]
    WrongShard { expected: ShardId, actual: ShardId },

    #[error("Proposal carries no transactions")]
    EmptyBatch,

    #[error("Unknown proposal: {0}")]
    UnknownProposal(String),
}
