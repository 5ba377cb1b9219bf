//! Shared test helpers for scenario and property tests.

use std::sync::Arc;

use tally_core::error::LedgerError;
use tally_core::fees::{required_entry_fee, required_stake_fee};
use tally_core::types::{AccountId, LedgerEvent, PositionId};
use tally_ledger::{Ledger, LedgerParams, ManualClock, MemoryWorld};

/// Unix time of cycle 0 in every harness.
pub const GENESIS: i64 = 1_700_000_000;

/// Cycle length used by every harness.
pub const DAY: i64 = 86_400;

/// Treasury account of every harness.
pub const TREASURY: AccountId = AccountId([0xEE; 20]);

/// Account id from a seed byte.
pub fn account(seed: u8) -> AccountId {
    AccountId([seed; 20])
}

/// Ledger parameters matching the harness clock.
pub fn params() -> LedgerParams {
    LedgerParams {
        genesis_time: GENESIS,
        cycle_length_secs: DAY as u64,
        treasury: TREASURY,
        ..LedgerParams::default()
    }
}

/// A ledger over in-memory collaborators and a manual clock at genesis.
pub struct Harness {
    pub ledger: Ledger,
    pub world: Arc<MemoryWorld>,
    pub clock: Arc<ManualClock>,
    /// Every event emitted so far.
    pub events: Vec<LedgerEvent>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let world = Arc::new(MemoryWorld::new());
        let clock = Arc::new(ManualClock::new(GENESIS));
        let ledger = Ledger::new(params(), clock.clone(), world.collaborators());
        Self {
            ledger,
            world,
            clock,
            events: Vec::new(),
        }
    }

    /// Move the clock forward by `cycles` whole cycles.
    pub fn advance(&self, cycles: u64) {
        self.clock.advance(cycles as i64 * DAY);
    }

    fn collect(&mut self) {
        self.events.extend(self.ledger.take_events());
    }

    /// Mint a deposit of `weight` to `owner`, fund the entry fee, and create
    /// a position from it paying exactly that fee.
    pub fn try_enter(&mut self, owner: AccountId, weight: u64) -> Result<PositionId, LedgerError> {
        let deposit = self.world.mint_deposit(owner, weight, 0);
        let fee = required_entry_fee(weight);
        self.world.fund_fees(&owner, fee);
        let result = self.ledger.create_position(&owner, deposit, fee);
        self.collect();
        result
    }

    pub fn enter(&mut self, owner: AccountId, weight: u64) -> PositionId {
        self.try_enter(owner, weight).unwrap()
    }

    /// Fund `owner` with `amount` plus the required fee and stake it.
    pub fn try_stake(
        &mut self,
        owner: AccountId,
        id: PositionId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let fee = required_stake_fee(amount);
        self.world.fund_stake(&owner, amount);
        self.world.fund_fees(&owner, fee);
        let result = self.ledger.stake(&owner, id, amount, fee);
        self.collect();
        result
    }

    pub fn stake(&mut self, owner: AccountId, id: PositionId, amount: u64) {
        self.try_stake(owner, id, amount).unwrap()
    }

    pub fn try_unstake(
        &mut self,
        owner: AccountId,
        id: PositionId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let result = self.ledger.unstake(&owner, id, amount);
        self.collect();
        result
    }

    pub fn try_claim(&mut self, owner: AccountId, id: PositionId) -> Result<u64, LedgerError> {
        let result = self.ledger.claim_fees(&owner, id);
        self.collect();
        result
    }

    /// Claim, treating `NothingToClaim` as zero.
    pub fn claim(&mut self, owner: AccountId, id: PositionId) -> u64 {
        match self.try_claim(owner, id) {
            Ok(amount) => amount,
            Err(LedgerError::NothingToClaim(_)) => 0,
            Err(e) => panic!("claim of {id} failed: {e}"),
        }
    }

    pub fn try_redeem(&mut self, owner: AccountId, id: PositionId) -> Result<(), LedgerError> {
        let result = self.ledger.redeem_deposit(&owner, id);
        self.collect();
        result
    }

    /// Sum of fees accrued to the pool in cycles `0..=current`.
    pub fn total_accrued(&self) -> u64 {
        (0..=self.ledger.current_cycle())
            .map(|c| self.ledger.cycle_accrued_fees(c))
            .sum()
    }

    /// Sum of all fees paid out by claims so far.
    pub fn total_claimed(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                LedgerEvent::FeesClaimed { amount, .. } => *amount,
                _ => 0,
            })
            .sum()
    }
}
