//! Tally ledger node binary.
//!
//! Hosts one ledger with RocksDB storage and serves it over JSON-RPC.
//! Configuration is layered: defaults, then an optional TOML file, then
//! `TALLY_` environment variables, then command-line flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tally_core::types::AccountId;
use tally_node_lib::{start_rpc_server, Node, NodeConfig};
use tracing::{info, warn};

/// Tally ledger node.
#[derive(Parser, Debug)]
#[command(
    name = "tally-node",
    version,
    about = "Tally ledger node with RocksDB storage and JSON-RPC server"
)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for ledger storage
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Unix timestamp at which cycle 0 starts
    #[arg(long)]
    genesis_time: Option<i64>,

    /// Cycle length in seconds
    #[arg(long)]
    cycle_length_secs: Option<u64>,

    /// Treasury account receiving the protocol share of entry fees (hex)
    #[arg(long)]
    treasury: Option<String>,

    /// Serve the RPC methods that mint deposits and fund accounts
    #[arg(long)]
    dev_rpc: bool,
}

impl Args {
    /// Merge CLI flags over the file and environment configuration.
    fn into_config(self) -> Result<(NodeConfig, String)> {
        let mut config =
            NodeConfig::load(self.config.as_deref()).context("failed to load configuration")?;

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.dev_rpc {
            config.dev_rpc = true;
        }
        if let Some(genesis_time) = self.genesis_time {
            config.ledger.genesis_time = genesis_time;
        }
        if let Some(len) = self.cycle_length_secs {
            config.ledger.cycle_length_secs = len;
        }
        if let Some(treasury) = self.treasury {
            config.ledger.treasury =
                AccountId::from_hex(&treasury).context("invalid treasury account")?;
        }
        config.ledger.validate()?;

        Ok((config, self.log_format))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, log_format) = Args::parse().into_config()?;

    init_logging(&config.log_level, &log_format);

    info!("Tally Ledger Node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!(
        genesis_time = config.ledger.genesis_time,
        cycle_length_secs = config.ledger.cycle_length_secs,
        treasury = %config.ledger.treasury,
        protocol_fee_bps = config.ledger.protocol_fee_bps,
        "ledger parameters"
    );

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data_dir {:?}", config.data_dir))?;

    let node = Node::open(config.clone()).context("failed to open ledger")?;
    let status = node.cycle_status()?;
    info!(
        cycle = status.cycle,
        last_known_cycle = status.last_known_cycle,
        total_power = %status.total_power,
        "ledger ready"
    );

    let rpc_handle = start_rpc_server(&config.rpc_addr(), node.clone())
        .await
        .context("failed to start RPC server")?;
    info!("RPC server listening on {}", config.rpc_addr());

    info!("Tally node running (Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("received Ctrl+C, shutting down...");

    rpc_handle.stop().ok();
    rpc_handle.stopped().await;
    info!("RPC server stopped");

    if let Err(e) = node.flush() {
        warn!("failed to flush storage: {e}");
    }
    info!("Tally node shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
