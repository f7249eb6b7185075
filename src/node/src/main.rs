//! TriBFT node binary
//!
//! Runs one reputation-weighted sharded BFT node: loads the TOML
//! configuration, wires the process-wide registries, and drives the node
//! event loop until shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tribft_chain::SystemClock;
use tribft_node::config::NodeConfig;
use tribft_node::node::{LocalHub, StaticLocation, TribftNode};
use tribft_reputation::{ReputationMetrics, ReputationTracker};
use tribft_shard::{GeoCoord, RegionalShardManager};

/// TriBFT consensus node CLI
#[derive(Parser)]
#[command(name = "tribft-node")]
#[command(about = "Reputation-weighted sharded BFT consensus node")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tribft.toml", env = "TRIBFT_CONFIG")]
    config: PathBuf,

    /// Node ID (overrides config)
    #[arg(long, env = "TRIBFT_NODE_ID")]
    node_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    /// Print the node version
    Version,

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "tribft.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{log_level},tribft_node=debug").into()),
        )
        .with_target(true)
        .init();

    if let Some(command) = cli.command {
        match command {
            Command::Version => {
                println!("tribft-node v{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            Command::InitConfig { output } => {
                return write_default_config(&output);
            }
        }
    }

    info!("Starting TriBFT node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NodeConfig::load(&cli.config)
        .with_context(|| format!("loading {:?}", cli.config))?;
    if let Some(node_id) = cli.node_id {
        config.node.id = node_id;
    }
    config.validate()?;

    // Process-wide services: clock, reputation tracker (with metrics),
    // and the authoritative shard registry.
    let clock = Arc::new(SystemClock::new());
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(
        ReputationMetrics::new(&registry).context("registering reputation metrics")?,
    );
    let reputation = ReputationTracker::new(config.reputation_config(), clock.clone())
        .with_metrics(metrics);
    let shards = Arc::new(RegionalShardManager::new(
        config.shard_config(),
        reputation,
        clock.clone(),
    ));

    // The in-process hub is the transport seam; a networked deployment
    // substitutes its own Transport implementation here.
    let hub = LocalHub::new();
    let inbound = hub.register(&config.node.id);
    let mobility = Arc::new(StaticLocation(GeoCoord::new(
        config.node.latitude,
        config.node.longitude,
    )));

    let mut node = TribftNode::new(config, shards, hub, mobility, inbound, clock)?;
    let shutdown = node.shutdown_handle();

    tokio::select! {
        result = node.run() => {
            if let Err(err) = result {
                error!(%err, "node error");
                return Err(err);
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
            let _ = shutdown.send(()).await;
        }
    }

    info!("node stopped");
    Ok(())
}

fn write_default_config(output: &PathBuf) -> Result<()> {
    let mut config = NodeConfig::default();
    config.node.id = "node-0".to_string();
    let rendered = toml::to_string_pretty(&config).context("rendering default config")?;
    std::fs::write(output, rendered).with_context(|| format!("writing {output:?}"))?;
    info!("wrote default configuration to {:?}", output);
    Ok(())
}
