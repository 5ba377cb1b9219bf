//! Node configuration for the Tally ledger node.
//!
//! Provides [`NodeConfig`] with defaults for data directory, RPC binding,
//! and ledger parameters. Values can be layered from a TOML file and
//! `TALLY_`-prefixed environment variables (nested keys use `__`, e.g.
//! `TALLY_LEDGER__CYCLE_LENGTH_SECS`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tally_core::constants::DEFAULT_RPC_PORT;
use tally_core::error::TallyError;
use tally_ledger::LedgerParams;

/// Configuration for a ledger node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "tally_ledger=trace").
    pub log_level: String,
    /// Serve the RPC methods that mint deposits and fund accounts.
    pub dev_rpc: bool,
    /// Parameters of the hosted ledger.
    pub ledger: LedgerParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally");

        Self {
            data_dir,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_level: "info".to_string(),
            dev_rpc: false,
            ledger: LedgerParams::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional TOML file, then the environment.
    ///
    /// Missing keys fall back to [`NodeConfig::default`].
    pub fn load(file: Option<&Path>) -> Result<Self, TallyError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TALLY")
                .separator("__")
                .try_parsing(true),
        );
        let cfg: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TallyError::Config(e.to_string()))?;
        cfg.ledger.validate()?;
        Ok(cfg)
    }

    /// Path to the RocksDB ledger data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledgerdata")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }
}
