//! In-memory collaborators.
//!
//! [`MemoryWorld`] implements every collaborator trait over one
//! mutex-guarded [`WorldState`]. The node uses it as its asset backend and
//! persists the snapshot alongside the ledger; tests use it to observe
//! balances.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use tally_core::error::LedgerError;
use tally_core::traits::{DepositCustody, FeeChannel, PositionRegistry, StakeToken};
use tally_core::types::{AccountId, DepositId, DepositTerms, PositionId};

use crate::ledger::Collaborators;

/// A deposit as tracked by the in-memory custodian.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DepositRecord {
    pub owner: AccountId,
    pub weight: u64,
    pub redeemed: bool,
    pub in_custody: bool,
    /// Unix time from which the underlying value may be redeemed.
    pub matures_at: i64,
    /// Recipient of the underlying value once redeemed.
    pub redeemed_to: Option<AccountId>,
}

/// Balances and registries of the in-memory world.
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct WorldState {
    pub deposits: BTreeMap<DepositId, DepositRecord>,
    pub next_deposit: u64,
    pub stake_balances: BTreeMap<AccountId, u64>,
    /// Stake principal held by the ledger.
    pub stake_escrow: u64,
    pub fee_balances: BTreeMap<AccountId, u64>,
    /// Fee currency received by the ledger and not yet paid out.
    pub fee_escrow: u64,
    pub position_owners: BTreeMap<PositionId, AccountId>,
    pub next_position: u64,
}

#[derive(Debug, Default)]
pub struct MemoryWorld {
    state: Mutex<WorldState>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: WorldState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> WorldState {
        self.state.lock().clone()
    }

    /// Replace the whole world with `state`.
    pub fn restore(&self, state: WorldState) {
        *self.state.lock() = state;
    }

    /// All four collaborator handles, backed by this world.
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            custody: self.clone(),
            stake_token: self.clone(),
            registry: self.clone(),
            fee_channel: self.clone(),
        }
    }

    /// Issue a deposit of `weight` to `owner`, redeemable from `matures_at`.
    pub fn mint_deposit(&self, owner: AccountId, weight: u64, matures_at: i64) -> DepositId {
        self.issue(owner, weight, matures_at, false)
    }

    /// Issue a deposit whose underlying value was already redeemed.
    pub fn mint_redeemed_deposit(&self, owner: AccountId, weight: u64) -> DepositId {
        self.issue(owner, weight, 0, true)
    }

    fn issue(&self, owner: AccountId, weight: u64, matures_at: i64, redeemed: bool) -> DepositId {
        let mut state = self.state.lock();
        state.next_deposit += 1;
        let id = DepositId(state.next_deposit);
        state.deposits.insert(
            id,
            DepositRecord {
                owner,
                weight,
                redeemed,
                in_custody: false,
                matures_at,
                redeemed_to: None,
            },
        );
        id
    }

    pub fn deposit(&self, id: DepositId) -> Option<DepositRecord> {
        self.state.lock().deposits.get(&id).cloned()
    }

    /// Credit `amount` of stake token to `account`.
    pub fn fund_stake(&self, account: &AccountId, amount: u64) {
        let mut state = self.state.lock();
        let balance = state.stake_balances.entry(*account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn stake_balance(&self, account: &AccountId) -> u64 {
        self.state
            .lock()
            .stake_balances
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    pub fn stake_escrow(&self) -> u64 {
        self.state.lock().stake_escrow
    }

    /// Credit `amount` of fee currency to `account`.
    pub fn fund_fees(&self, account: &AccountId, amount: u64) {
        let mut state = self.state.lock();
        let balance = state.fee_balances.entry(*account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn fee_escrow(&self) -> u64 {
        self.state.lock().fee_escrow
    }

    pub fn fee_balance(&self, account: &AccountId) -> u64 {
        self.state
            .lock()
            .fee_balances
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    /// Move ownership of `position` to `to`.
    pub fn transfer_position(
        &self,
        position: PositionId,
        from: &AccountId,
        to: AccountId,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(position, from)?;
        self.state.lock().position_owners.insert(position, to);
        Ok(())
    }
}

impl DepositCustody for MemoryWorld {
    fn terms(&self, deposit: DepositId) -> Result<DepositTerms, LedgerError> {
        let state = self.state.lock();
        let record = state
            .deposits
            .get(&deposit)
            .ok_or(LedgerError::UnknownDeposit(deposit.0))?;
        Ok(DepositTerms {
            owner: record.owner,
            weight: record.weight,
            redeemed: record.redeemed,
            in_custody: record.in_custody,
        })
    }

    fn take_custody(&self, deposit: DepositId, from: &AccountId) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let record = state
            .deposits
            .get_mut(&deposit)
            .ok_or(LedgerError::UnknownDeposit(deposit.0))?;
        if record.owner != *from {
            return Err(LedgerError::NotOwner(format!("deposit {deposit}")));
        }
        if record.in_custody {
            return Err(LedgerError::DepositInUse(deposit.0));
        }
        record.in_custody = true;
        Ok(())
    }

    fn is_redeemable(&self, deposit: DepositId, now: i64) -> bool {
        self.state
            .lock()
            .deposits
            .get(&deposit)
            .is_some_and(|d| !d.redeemed && now >= d.matures_at)
    }

    fn redeem(&self, deposit: DepositId, to: &AccountId) {
        if let Some(record) = self.state.lock().deposits.get_mut(&deposit) {
            record.redeemed = true;
            record.redeemed_to = Some(*to);
        }
    }
}

impl StakeToken for MemoryWorld {
    fn transfer_from(&self, from: &AccountId, amount: u64) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let have = state.stake_balances.get(from).copied().unwrap_or(0);
        if have < amount {
            return Err(LedgerError::InsufficientStakeBalance { have, need: amount });
        }
        state.stake_balances.insert(*from, have - amount);
        state.stake_escrow = state.stake_escrow.saturating_add(amount);
        Ok(())
    }

    fn transfer(&self, to: &AccountId, amount: u64) {
        let mut state = self.state.lock();
        state.stake_escrow = state.stake_escrow.saturating_sub(amount);
        let balance = state.stake_balances.entry(*to).or_default();
        *balance = balance.saturating_add(amount);
    }

    fn balance_of(&self, account: &AccountId) -> u64 {
        self.stake_balance(account)
    }
}

impl PositionRegistry for MemoryWorld {
    fn mint(&self, owner: &AccountId) -> PositionId {
        let mut state = self.state.lock();
        state.next_position += 1;
        let id = PositionId(state.next_position);
        state.position_owners.insert(id, *owner);
        id
    }

    fn owner_of(&self, position: PositionId) -> Option<AccountId> {
        self.state.lock().position_owners.get(&position).copied()
    }
}

impl FeeChannel for MemoryWorld {
    fn receive(&self, from: &AccountId, amount: u64) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let have = state.fee_balances.get(from).copied().unwrap_or(0);
        if have < amount {
            return Err(LedgerError::InsufficientFeeBalance { have, need: amount });
        }
        state.fee_balances.insert(*from, have - amount);
        state.fee_escrow = state.fee_escrow.saturating_add(amount);
        Ok(())
    }

    fn credit(&self, to: &AccountId, amount: u64) {
        let mut state = self.state.lock();
        state.fee_escrow = state.fee_escrow.saturating_sub(amount);
        let balance = state.fee_balances.entry(*to).or_default();
        *balance = balance.saturating_add(amount);
    }
}
