//! TriBFT node harness
//!
//! Wires the shard registry, reputation tracker, consensus engine,
//! transaction pool and lightweight sync into one runnable node, with
//! configuration loading and the capability traits (`Transport`,
//! `MobilityOracle`) the core consumes.

pub mod config;
pub mod node;

pub use config::NodeConfig;
pub use node::{LocalHub, MobilityOracle, StaticLocation, Transport, TribftNode};
