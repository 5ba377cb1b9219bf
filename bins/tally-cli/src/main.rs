//! tally-cli: Command-line client for a Tally ledger node.
//!
//! Queries cycle and position state and submits ledger operations over
//! JSON-RPC. Results are printed as pretty JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::{json, Value};
use tally_core::constants::DEFAULT_RPC_PORT;
use tally_core::fees::required_stake_fee;

/// Tally ledger command-line client.
#[derive(Parser)]
#[command(name = "tally-cli")]
#[command(version, about = "Query and operate a Tally ledger node.")]
struct Cli {
    /// RPC endpoint of the node.
    #[arg(long, global = true, default_value_t = format!("http://127.0.0.1:{DEFAULT_RPC_PORT}"))]
    rpc_endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current cycle and global totals.
    Status,
    /// Show the reward emission of a cycle.
    Reward { cycle: u64 },
    /// Show the fees accrued during a cycle.
    Fees { cycle: u64 },
    /// Show the fees-per-power accumulator at a cycle.
    Accumulator { cycle: u64 },
    /// Show a position.
    Position { id: u64 },
    /// Show what a position could claim now.
    Claimable { id: u64 },
    /// Show an account's stake and fee balances.
    Account { account: String },
    /// Create a position from a deposit.
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        deposit: u64,
        /// Entry fee paid; any excess is refunded.
        #[arg(long)]
        fee: u64,
    },
    /// Stake into a position.
    Stake {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        amount: u64,
        /// Stake fee paid; defaults to the required fee.
        #[arg(long)]
        fee: Option<u64>,
    },
    /// Withdraw matured stake from a position.
    Unstake {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        amount: u64,
    },
    /// Claim a position's fees.
    Claim {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
    },
    /// Redeem the deposit underlying a position.
    Redeem {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        id: u64,
    },
    /// Issue a deposit on a development node.
    MintDeposit {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        weight: u64,
        /// Unix time from which the deposit may be redeemed.
        #[arg(long, default_value_t = 0)]
        matures_at: i64,
    },
    /// Credit stake token and fee currency to an account on a development node.
    Fund {
        #[arg(long)]
        account: String,
        /// Stake token to credit.
        #[arg(long, default_value_t = 0)]
        stake: u64,
        /// Fee currency to credit.
        #[arg(long, default_value_t = 0)]
        fees: u64,
    },
}

impl Commands {
    /// RPC method name and positional parameters.
    fn to_request(&self) -> (&'static str, Vec<Value>) {
        match self {
            Commands::Status => ("getcyclestatus", vec![]),
            Commands::Reward { cycle } => ("getreward", vec![json!(cycle)]),
            Commands::Fees { cycle } => ("getcyclefees", vec![json!(cycle)]),
            Commands::Accumulator { cycle } => ("getaccumulator", vec![json!(cycle)]),
            Commands::Position { id } => ("getposition", vec![json!(id)]),
            Commands::Claimable { id } => ("getclaimable", vec![json!(id)]),
            Commands::Account { account } => ("getaccount", vec![json!(account)]),
            Commands::Create { owner, deposit, fee } => {
                ("createposition", vec![json!(owner), json!(deposit), json!(fee)])
            }
            Commands::Stake { caller, id, amount, fee } => {
                let fee = fee.unwrap_or_else(|| required_stake_fee(*amount));
                ("stake", vec![json!(caller), json!(id), json!(amount), json!(fee)])
            }
            Commands::Unstake { caller, id, amount } => {
                ("unstake", vec![json!(caller), json!(id), json!(amount)])
            }
            Commands::Claim { caller, id } => ("claimfees", vec![json!(caller), json!(id)]),
            Commands::Redeem { caller, id } => ("redeemdeposit", vec![json!(caller), json!(id)]),
            Commands::MintDeposit { owner, weight, matures_at } => {
                ("mintdeposit", vec![json!(owner), json!(weight), json!(matures_at)])
            }
            Commands::Fund { account, stake, fees } => {
                ("fundaccount", vec![json!(account), json!(stake), json!(fees)])
            }
        }
    }
}

async fn call(client: &HttpClient, method: &str, values: Vec<Value>) -> Result<Value> {
    let mut params = ArrayParams::new();
    for value in values {
        params.insert(value).context("failed to encode parameter")?;
    }
    client
        .request(method, params)
        .await
        .with_context(|| format!("RPC {method} failed"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = HttpClientBuilder::default()
        .build(&cli.rpc_endpoint)
        .context("Failed to connect to RPC")?;

    let (method, values) = cli.command.to_request();
    tracing::debug!(method, endpoint = %cli.rpc_endpoint, "sending request");
    let result = call(&client, method, values).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
