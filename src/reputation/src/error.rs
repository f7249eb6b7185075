//! Error types for the reputation system

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReputationError>;

#[derive(Error, Debug)]
pub enum ReputationError {
    #[error("Invalid reputation score: {0} (must be 0-1)")]
    InvalidScore(f64),

    #[error("Unknown verification event: {0}")]
    UnknownEvent(String),

    #[error("Prometheus metric error: {0}")]
    Metrics(#[from] prometheus::Error),
}
