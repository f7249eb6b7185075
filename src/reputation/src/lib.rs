//! Reputation system for TriBFT
//!
//! Tracks node behavior and derives a trust score in [0, 1] from a
//! dual model:
//! - **Global reputation** (R_g): slow-moving long-term component
//! - **Local performance** (R_l): instant performance, updated per event
//! - Final score `R = w·R_g + (1−w)·R_l` with `w = exp(−λ·N_l)`, so nodes
//!   with little local history lean on their global record and active
//!   nodes are judged by recent behavior.
//!
//! Positive events use a marginal-diminishing reward `β/(1+R)` so
//! high-reputation nodes gain less per event; negative events apply fixed
//! penalties. Scores feed committee selection: trusted nodes (R ≥ 0.8)
//! become consensus candidates, and reports from candidate-tier nodes
//! (R < 0.2) go through cross-verification by trusted verifiers.

pub mod error;
pub mod metrics;
pub mod tracker;
pub mod types;
pub mod verifier;

pub use error::{ReputationError, Result};
pub use metrics::ReputationMetrics;
pub use tracker::{ReputationStatistics, ReputationTracker};
pub use types::{EventWeight, ReputationConfig, ReputationEvent, ReputationRecord, TrustTier};
pub use verifier::{LowRepVerifier, PendingEvent};
