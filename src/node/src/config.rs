//! Node configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tribft_consensus::ConsensusConfig;
use tribft_reputation::ReputationConfig;
use tribft_shard::ShardConfig;

/// Complete node configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeConfig {
    pub node: NodeSection,

    #[serde(default)]
    pub consensus: ConsensusSection,

    #[serde(default)]
    pub shard: ShardSection,

    #[serde(default)]
    pub committee: CommitteeSection,

    #[serde(default)]
    pub reputation: ReputationSection,

    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub maintenance: MaintenanceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    pub id: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Roadside unit: permanent consensus-eligible infrastructure
    #[serde(default)]
    pub is_rsu: bool,

    /// Exactly one node per process drives registry-wide sweeps
    /// (reputation decay, shard rebalance)
    #[serde(default)]
    pub registry_maintainer: bool,

    /// Initial position, in planar coordinate units (meters)
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: String::new(),
            log_level: default_log_level(),
            is_rsu: false,
            registry_maintainer: false,
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsensusSection {
    /// Leader proposal cadence in seconds
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: f64,

    /// Minimum pooled transactions before the leader proposes
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-round ceiling in seconds
    #[serde(default = "default_consensus_timeout")]
    pub consensus_timeout_secs: f64,

    /// Committed blocks per committee epoch
    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            block_interval_secs: default_block_interval(),
            batch_size: default_batch_size(),
            consensus_timeout_secs: default_consensus_timeout(),
            epoch_length: default_epoch_length(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShardSection {
    /// Regional shard coverage radius, meters
    #[serde(default = "default_shard_radius")]
    pub radius: f64,

    #[serde(default = "default_min_shard_size")]
    pub min_shard_size: usize,

    #[serde(default = "default_max_shard_size")]
    pub max_shard_size: usize,
}

impl Default for ShardSection {
    fn default() -> Self {
        Self {
            radius: default_shard_radius(),
            min_shard_size: default_min_shard_size(),
            max_shard_size: default_max_shard_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommitteeSection {
    /// Primary committee size G
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Redundant backup count K
    #[serde(default = "default_redundant_count")]
    pub redundant_count: usize,
}

impl Default for CommitteeSection {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            redundant_count: default_redundant_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReputationSection {
    #[serde(default = "default_initial_reputation")]
    pub initial_score: f64,

    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    #[serde(default = "default_lambda")]
    pub lambda: f64,

    /// Seconds between decay sweeps
    #[serde(default = "default_decay_interval")]
    pub decay_interval_secs: f64,
}

impl Default for ReputationSection {
    fn default() -> Self {
        Self {
            initial_score: default_initial_reputation(),
            decay_rate: default_decay_rate(),
            lambda: default_lambda(),
            decay_interval_secs: default_decay_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolSection {
    #[serde(default = "default_max_tx_pool_size")]
    pub max_tx_pool_size: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_tx_pool_size: default_max_tx_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceSection {
    /// Seconds between shard rebalance sweeps
    #[serde(default = "default_shard_maintenance_interval")]
    pub shard_maintenance_interval_secs: f64,

    /// Seconds between heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: f64,

    /// Sync retention window in blocks
    #[serde(default = "default_keep_last_blocks")]
    pub keep_last_blocks: u64,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            shard_maintenance_interval_secs: default_shard_maintenance_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            keep_last_blocks: default_keep_last_blocks(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}
fn default_block_interval() -> f64 {
    0.5
}
fn default_batch_size() -> usize {
    100
}
fn default_consensus_timeout() -> f64 {
    5.0
}
fn default_epoch_length() -> u64 {
    10
}
fn default_shard_radius() -> f64 {
    3000.0
}
fn default_min_shard_size() -> usize {
    50
}
fn default_max_shard_size() -> usize {
    250
}
fn default_group_size() -> usize {
    15
}
fn default_redundant_count() -> usize {
    5
}
fn default_initial_reputation() -> f64 {
    0.5
}
fn default_decay_rate() -> f64 {
    0.01
}
fn default_lambda() -> f64 {
    0.1
}
fn default_decay_interval() -> f64 {
    5.0
}
fn default_max_tx_pool_size() -> usize {
    1000
}
fn default_shard_maintenance_interval() -> f64 {
    10.0
}
fn default_heartbeat_interval() -> f64 {
    1.0
}
fn default_keep_last_blocks() -> u64 {
    100
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;
        let config: NodeConfig =
            toml::from_str(&contents).context("Failed to parse configuration file")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.id.is_empty() {
            anyhow::bail!("node.id must not be empty");
        }
        if self.consensus.batch_size == 0 {
            anyhow::bail!("consensus.batch_size must be positive");
        }
        if self.consensus.block_interval_secs <= 0.0 {
            anyhow::bail!("consensus.block_interval_secs must be positive");
        }
        if self.consensus.consensus_timeout_secs <= 0.0 {
            anyhow::bail!("consensus.consensus_timeout_secs must be positive");
        }
        if self.consensus.epoch_length == 0 {
            anyhow::bail!("consensus.epoch_length must be positive");
        }
        if self.shard.min_shard_size >= self.shard.max_shard_size {
            anyhow::bail!("shard.min_shard_size must be below shard.max_shard_size");
        }
        if self.shard.radius <= 0.0 {
            anyhow::bail!("shard.radius must be positive");
        }
        if !(0.0..=1.0).contains(&self.reputation.initial_score) {
            anyhow::bail!("reputation.initial_score must be within [0, 1]");
        }
        if self.committee.group_size < 2 {
            anyhow::bail!("committee.group_size must be at least 2");
        }
        Ok(())
    }

    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            shard_radius: self.shard.radius,
            min_shard_size: self.shard.min_shard_size,
            max_shard_size: self.shard.max_shard_size,
            group_size: self.committee.group_size,
            redundant_count: self.committee.redundant_count,
            epoch_length: self.consensus.epoch_length,
        }
    }

    pub fn reputation_config(&self) -> ReputationConfig {
        ReputationConfig {
            initial_reputation: self.reputation.initial_score,
            decay_rate: self.reputation.decay_rate,
            lambda: self.reputation.lambda,
            ..Default::default()
        }
    }

    pub fn consensus_config(&self, shard_id: i32) -> ConsensusConfig {
        ConsensusConfig {
            node_id: self.node.id.clone(),
            shard_id,
            consensus_timeout: self.consensus.consensus_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> NodeConfig {
        NodeConfig {
            node: NodeSection {
                id: "vehicle-0".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_the_deployment_profile() {
        let config = minimal();
        assert_eq!(config.consensus.block_interval_secs, 0.5);
        assert_eq!(config.consensus.batch_size, 100);
        assert_eq!(config.consensus.consensus_timeout_secs, 5.0);
        assert_eq!(config.consensus.epoch_length, 10);
        assert_eq!(config.shard.radius, 3000.0);
        assert_eq!(config.shard.min_shard_size, 50);
        assert_eq!(config.shard.max_shard_size, 250);
        assert_eq!(config.committee.group_size, 15);
        assert_eq!(config.committee.redundant_count, 5);
        assert_eq!(config.reputation.initial_score, 0.5);
        assert_eq!(config.reputation.decay_rate, 0.01);
        assert_eq!(config.pool.max_tx_pool_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [node]
            id = "rsu-3"
            is_rsu = true
            "#,
        )
        .unwrap();
        assert_eq!(config.node.id, "rsu-3");
        assert!(config.node.is_rsu);
        assert_eq!(config.consensus.batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = minimal();
        config.consensus.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.shard.min_shard_size = 300;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.reputation.initial_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.node.id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn section_conversions_carry_values_through() {
        let config = minimal();
        let shard = config.shard_config();
        assert_eq!(shard.shard_radius, 3000.0);
        assert_eq!(shard.epoch_length, 10);

        let consensus = config.consensus_config(2);
        assert_eq!(consensus.shard_id, 2);
        assert_eq!(consensus.consensus_timeout, 5.0);

        let reputation = config.reputation_config();
        assert_eq!(reputation.initial_reputation, 0.5);
        assert_eq!(reputation.lambda, 0.1);
    }
}
