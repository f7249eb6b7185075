//! Error types for shard management

use thiserror::Error;
use tribft_chain::ShardId;

pub type Result<T> = std::result::Result<T, ShardError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("Unknown shard: {0}")]
    UnknownShard(ShardId),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Shard {0} has no members to elect from")]
    EmptyShard(ShardId),
}
