//! # tally-node: Ledger node: RocksDB, RPC, composition.
//!
//! Hosts a single ledger behind an exclusive lock:
//! - [`storage::LedgerStore`]: persistent ledger state backed by RocksDB
//! - [`node::Node`]: ledger, in-memory collaborators, and storage wired together
//! - [`rpc`]: JSON-RPC server for external access
//! - [`config::NodeConfig`]: node configuration

pub mod config;
pub mod node;
pub mod rpc;
pub mod storage;

pub use config::NodeConfig;
pub use node::{CycleStatus, Node, PositionView};
pub use rpc::start_rpc_server;
pub use storage::LedgerStore;
