//! JSON-RPC server for the Tally ledger node.
//!
//! Uses jsonrpsee 0.24. Power and accumulator values are `u128` and are
//! rendered as decimal strings; account ids are 40-character hex strings.
//!
//! Methods that mint deposits or fund accounts in the in-memory
//! collaborators live in [`TallyDevRpc`] and are only served when
//! `dev_rpc` is enabled in the node configuration.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tally_core::error::{LedgerError, TallyError};
use tally_core::types::{AccountId, DepositId, PositionId};
use tally_ledger::Claimable;

use crate::node::{CycleStatus, Node, PositionView};

/// JSON representation of the cycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStatusJson {
    pub cycle: u64,
    /// Cycle start as Unix seconds.
    pub cycle_start: i64,
    /// Cycle start as RFC 3339, if representable.
    pub cycle_start_utc: Option<String>,
    pub cycle_length_secs: u64,
    pub last_known_cycle: u64,
    pub total_power: String,
    /// Reward emission of the current cycle.
    pub reward: String,
    /// Fees accrued so far in the current cycle.
    pub accrued_fees: u64,
}

impl From<CycleStatus> for CycleStatusJson {
    fn from(s: CycleStatus) -> Self {
        Self {
            cycle: s.cycle,
            cycle_start: s.cycle_start,
            cycle_start_utc: chrono::DateTime::from_timestamp(s.cycle_start, 0)
                .map(|t| t.to_rfc3339()),
            cycle_length_secs: s.cycle_length_secs,
            last_known_cycle: s.last_known_cycle,
            total_power: s.total_power.to_string(),
            reward: s.reward.to_string(),
            accrued_fees: s.accrued_fees,
        }
    }
}

/// JSON representation of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionJson {
    pub id: u64,
    pub owner: Option<String>,
    pub deposit: u64,
    pub entry_cycle: u64,
    pub entry_weight: u64,
    /// `None` while the entry cycle is running.
    pub base_power: Option<String>,
    pub current_power: Option<String>,
    pub staked_amount: u64,
    pub withdrawable_stake: u64,
    pub redeemed: bool,
    pub last_claimed_cycle: Option<u64>,
}

impl From<PositionView> for PositionJson {
    fn from(v: PositionView) -> Self {
        Self {
            id: v.position.id.0,
            owner: v.owner.map(|o| o.to_string()),
            deposit: v.position.deposit.0,
            entry_cycle: v.position.entry_cycle,
            entry_weight: v.position.entry_weight,
            base_power: v.base_power.map(|p| p.to_string()),
            current_power: v.current_power.map(|p| p.to_string()),
            staked_amount: v.position.staked_amount,
            withdrawable_stake: v.withdrawable_stake,
            redeemed: v.position.redeemed,
            last_claimed_cycle: v.position.last_claimed_cycle,
        }
    }
}

/// JSON representation of claimable fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimableJson {
    pub entry_share: String,
    pub post_entry_share: String,
    pub total: u64,
    pub through_cycle: Option<u64>,
}

impl ClaimableJson {
    fn from_claimable(c: Claimable) -> Result<Self, ErrorObjectOwned> {
        Ok(Self {
            entry_share: c.entry_share.to_string(),
            post_entry_share: c.post_entry_share.to_string(),
            total: c.total().map_err(|e| tally_error(e.into()))?,
            through_cycle: c.through_cycle,
        })
    }
}

/// JSON representation of an account's collaborator balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountJson {
    pub account: String,
    pub stake_balance: u64,
    pub fee_balance: u64,
}

/// Parse a 40-character hex account id.
pub fn parse_account(hex_str: &str) -> Result<AccountId, ErrorObjectOwned> {
    AccountId::from_hex(hex_str).map_err(|e| rpc_error(-22, &format!("invalid account: {e}")))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// Map a node error to a JSON-RPC error.
fn tally_error(e: TallyError) -> ErrorObjectOwned {
    let code = match &e {
        TallyError::Ledger(LedgerError::UnknownPosition(_) | LedgerError::UnknownDeposit(_)) => -5,
        TallyError::Ledger(_) => -25,
        TallyError::Storage(_) | TallyError::Config(_) => -1,
    };
    rpc_error(code, &e.to_string())
}

/// The Tally JSON-RPC interface.
#[rpc(server)]
pub trait TallyRpc {
    /// Returns the current cycle and global totals.
    #[method(name = "getcyclestatus")]
    async fn get_cycle_status(&self) -> Result<CycleStatusJson, ErrorObjectOwned>;

    /// Returns the reward emission of a cycle.
    #[method(name = "getreward")]
    async fn get_reward(&self, cycle: u64) -> Result<String, ErrorObjectOwned>;

    /// Returns the fees accrued during a cycle.
    #[method(name = "getcyclefees")]
    async fn get_cycle_fees(&self, cycle: u64) -> Result<u64, ErrorObjectOwned>;

    /// Returns the fees-per-power accumulator at a cycle.
    #[method(name = "getaccumulator")]
    async fn get_accumulator(&self, cycle: u64) -> Result<String, ErrorObjectOwned>;

    /// Returns a position.
    #[method(name = "getposition")]
    async fn get_position(&self, id: u64) -> Result<PositionJson, ErrorObjectOwned>;

    /// Returns what a position could claim now.
    #[method(name = "getclaimable")]
    async fn get_claimable(&self, id: u64) -> Result<ClaimableJson, ErrorObjectOwned>;

    /// Returns an account's stake and fee balances.
    #[method(name = "getaccount")]
    async fn get_account(&self, account: String) -> Result<AccountJson, ErrorObjectOwned>;

    /// Creates a position from a deposit. Returns the position id.
    #[method(name = "createposition")]
    async fn create_position(
        &self,
        owner: String,
        deposit: u64,
        fee: u64,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Stakes into a position.
    #[method(name = "stake")]
    async fn stake(
        &self,
        caller: String,
        id: u64,
        amount: u64,
        fee: u64,
    ) -> Result<PositionJson, ErrorObjectOwned>;

    /// Withdraws matured stake from a position.
    #[method(name = "unstake")]
    async fn unstake(
        &self,
        caller: String,
        id: u64,
        amount: u64,
    ) -> Result<PositionJson, ErrorObjectOwned>;

    /// Claims a position's fees. Returns the amount paid.
    #[method(name = "claimfees")]
    async fn claim_fees(&self, caller: String, id: u64) -> Result<u64, ErrorObjectOwned>;

    /// Redeems the deposit underlying a position.
    #[method(name = "redeemdeposit")]
    async fn redeem_deposit(&self, caller: String, id: u64) -> Result<PositionJson, ErrorObjectOwned>;
}

/// Development methods that create assets out of thin air.
#[rpc(server)]
pub trait TallyDevRpc {
    /// Issues a deposit in the in-memory custodian. Returns the deposit id.
    #[method(name = "mintdeposit")]
    async fn mint_deposit(
        &self,
        owner: String,
        weight: u64,
        matures_at: i64,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Credits stake token and fee currency to an account.
    #[method(name = "fundaccount")]
    async fn fund_account(
        &self,
        account: String,
        stake: u64,
        fees: u64,
    ) -> Result<AccountJson, ErrorObjectOwned>;
}

/// Implementation of the Tally JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    /// Create a new RPC server implementation wrapping the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    fn position_json(&self, id: PositionId) -> Result<PositionJson, ErrorObjectOwned> {
        self.node.position(id).map(Into::into).map_err(tally_error)
    }

    fn account_json(&self, account: AccountId) -> AccountJson {
        account_json(&self.node, account)
    }
}

fn account_json(node: &Node, account: AccountId) -> AccountJson {
    AccountJson {
        account: account.to_string(),
        stake_balance: node.stake_balance(&account),
        fee_balance: node.fee_balance(&account),
    }
}

#[async_trait]
impl TallyRpcServer for RpcServerImpl {
    async fn get_cycle_status(&self) -> Result<CycleStatusJson, ErrorObjectOwned> {
        self.node.cycle_status().map(Into::into).map_err(tally_error)
    }

    async fn get_reward(&self, cycle: u64) -> Result<String, ErrorObjectOwned> {
        let reward = self.node.reward_at(cycle).map_err(tally_error)?;
        Ok(reward.to_string())
    }

    async fn get_cycle_fees(&self, cycle: u64) -> Result<u64, ErrorObjectOwned> {
        Ok(self.node.cycle_accrued_fees(cycle))
    }

    async fn get_accumulator(&self, cycle: u64) -> Result<String, ErrorObjectOwned> {
        let acc = self
            .node
            .fees_per_power_accumulator(cycle)
            .map_err(tally_error)?;
        Ok(acc.to_string())
    }

    async fn get_position(&self, id: u64) -> Result<PositionJson, ErrorObjectOwned> {
        self.position_json(PositionId(id))
    }

    async fn get_claimable(&self, id: u64) -> Result<ClaimableJson, ErrorObjectOwned> {
        let claim = self
            .node
            .claimable_fees(PositionId(id))
            .map_err(tally_error)?;
        ClaimableJson::from_claimable(claim)
    }

    async fn get_account(&self, account: String) -> Result<AccountJson, ErrorObjectOwned> {
        Ok(self.account_json(parse_account(&account)?))
    }

    async fn create_position(
        &self,
        owner: String,
        deposit: u64,
        fee: u64,
    ) -> Result<u64, ErrorObjectOwned> {
        let owner = parse_account(&owner)?;
        let id = self
            .node
            .create_position(&owner, DepositId(deposit), fee)
            .map_err(tally_error)?;
        Ok(id.0)
    }

    async fn stake(
        &self,
        caller: String,
        id: u64,
        amount: u64,
        fee: u64,
    ) -> Result<PositionJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        self.node
            .stake(&caller, PositionId(id), amount, fee)
            .map_err(tally_error)?;
        self.position_json(PositionId(id))
    }

    async fn unstake(
        &self,
        caller: String,
        id: u64,
        amount: u64,
    ) -> Result<PositionJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        self.node
            .unstake(&caller, PositionId(id), amount)
            .map_err(tally_error)?;
        self.position_json(PositionId(id))
    }

    async fn claim_fees(&self, caller: String, id: u64) -> Result<u64, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        self.node
            .claim_fees(&caller, PositionId(id))
            .map_err(tally_error)
    }

    async fn redeem_deposit(&self, caller: String, id: u64) -> Result<PositionJson, ErrorObjectOwned> {
        let caller = parse_account(&caller)?;
        self.node
            .redeem_deposit(&caller, PositionId(id))
            .map_err(tally_error)?;
        self.position_json(PositionId(id))
    }
}

/// Implementation of the development methods.
pub struct DevRpcImpl {
    node: Arc<Node>,
}

impl DevRpcImpl {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl TallyDevRpcServer for DevRpcImpl {
    async fn mint_deposit(
        &self,
        owner: String,
        weight: u64,
        matures_at: i64,
    ) -> Result<u64, ErrorObjectOwned> {
        let owner = parse_account(&owner)?;
        let id = self
            .node
            .mint_deposit(owner, weight, matures_at)
            .map_err(tally_error)?;
        Ok(id.0)
    }

    async fn fund_account(
        &self,
        account: String,
        stake: u64,
        fees: u64,
    ) -> Result<AccountJson, ErrorObjectOwned> {
        let account = parse_account(&account)?;
        self.node
            .fund_account(account, stake, fees)
            .map_err(tally_error)?;
        Ok(account_json(&self.node, account))
    }
}

/// Start the JSON-RPC server on the given address.
///
/// The development methods are registered only if the node's configuration
/// enables them. Returns a [`ServerHandle`] that can be used to stop the
/// server.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, TallyError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| TallyError::Storage(format!("RPC server error: {e}")))?;

    let dev_rpc = node.config().dev_rpc;
    let mut module = RpcServerImpl::new(node.clone()).into_rpc();
    if dev_rpc {
        module
            .merge(DevRpcImpl::new(node).into_rpc())
            .map_err(|e| TallyError::Config(format!("RPC method conflict: {e}")))?;
        warn!("development RPC methods enabled");
    }
    let handle = server.start(module);

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::types::DepositId;
    use tally_ledger::Position;

    #[test]
    fn parse_account_valid() {
        let hex_str = "aa".repeat(20);
        assert_eq!(parse_account(&hex_str).unwrap(), AccountId([0xAA; 20]));
        assert!(parse_account(&format!("0x{hex_str}")).is_ok());
    }

    #[test]
    fn parse_account_invalid() {
        let err = parse_account("abcdef").unwrap_err();
        assert_eq!(err.code(), -22);
        assert!(err.message().contains("invalid account"));
    }

    #[test]
    fn ledger_errors_map_to_codes() {
        assert_eq!(tally_error(LedgerError::UnknownPosition(3).into()).code(), -5);
        assert_eq!(tally_error(LedgerError::NothingToClaim(3).into()).code(), -25);
        assert_eq!(tally_error(TallyError::Storage("x".into())).code(), -1);
    }

    #[test]
    fn cycle_status_json_renders_power_as_string() {
        let json: CycleStatusJson = CycleStatus {
            cycle: 2,
            cycle_start: 0,
            cycle_length_secs: 86_400,
            last_known_cycle: 2,
            total_power: u128::MAX,
            reward: 10,
            accrued_fees: 5,
        }
        .into();
        let text = serde_json::to_string(&json).unwrap();
        assert!(text.contains(&format!("\"total_power\":\"{}\"", u128::MAX)));
        assert!(text.contains("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn position_json_from_view() {
        let view = PositionView {
            position: Position::new(PositionId(4), DepositId(9), 1, 50, false),
            owner: Some(AccountId([1; 20])),
            base_power: None,
            current_power: None,
            withdrawable_stake: 0,
        };
        let json = PositionJson::from(view);
        assert_eq!(json.id, 4);
        assert_eq!(json.deposit, 9);
        assert_eq!(json.owner, Some("01".repeat(20)));
        assert!(json.base_power.is_none());
    }

    #[test]
    fn claimable_json_totals() {
        let json = ClaimableJson::from_claimable(Claimable {
            entry_share: 7,
            post_entry_share: 3,
            through_cycle: Some(1),
        })
        .unwrap();
        assert_eq!(json.total, 10);
        assert_eq!(json.entry_share, "7");
    }
}
