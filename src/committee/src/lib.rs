//! Committee selection for TriBFT
//!
//! Each shard elects a small consensus committee per epoch through a
//! simplified VRF: a stable 64-bit hash of `node ‖ seed` gives every
//! candidate a sortition score, and the top `G` scores become primary
//! voters, subject to an RSU quorum floor (`rsu_count ≥ floor(G/3)`)
//! that keeps a third of every committee anchored on stable roadside
//! infrastructure. The next `K` candidates become redundant hot backups
//! that sync but do not vote.
//!
//! `elect` is a pure function of its inputs, so every observer derives
//! the same committee from the same (candidates, rsus, seed).

pub mod selector;

pub use selector::{elect, Committee, CommitteeSelector, NodeRole};

/// Default primary committee size (G)
pub const DEFAULT_GROUP_SIZE: usize = 15;

/// Default redundant backup count (K)
pub const DEFAULT_REDUNDANT_COUNT: usize = 5;

/// Smallest committee that can still form a quorum
pub const MIN_VIABLE_COMMITTEE: usize = 2;
