//! Ledger node composition.
//!
//! The [`Node`] wires the ledger, its in-memory collaborators, and RocksDB
//! storage together. Every mutating call runs under the ledger lock, then
//! writes the touched records in a single batch and fans the emitted events
//! out to subscribers.
//!
//! If a batch cannot be written, the in-memory ledger and collaborators are
//! reloaded from storage so memory never runs ahead of disk. A node whose
//! reload also fails refuses further operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use tally_core::error::{LedgerError, TallyError};
use tally_core::traits::{Clock, PositionRegistry};
use tally_core::types::{AccountId, Cycle, DepositId, LedgerEvent, PositionId};
use tally_ledger::{Claimable, Ledger, MemoryWorld, Position, SystemClock};

use crate::config::NodeConfig;
use crate::storage::LedgerStore;

/// Capacity of the event broadcast channel. Slow subscribers lag.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Snapshot of the ledger's clock and global totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStatus {
    pub cycle: Cycle,
    /// Unix time at which `cycle` started.
    pub cycle_start: i64,
    pub cycle_length_secs: u64,
    pub last_known_cycle: Cycle,
    pub total_power: u128,
    pub reward: u128,
    pub accrued_fees: u64,
}

/// Full view of a position as seen during the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionView {
    pub position: Position,
    pub owner: Option<AccountId>,
    pub base_power: Option<u128>,
    pub current_power: Option<u128>,
    pub withdrawable_stake: u64,
}

/// The ledger node.
pub struct Node {
    ledger: Mutex<Ledger>,
    storage: RwLock<LedgerStore>,
    world: Arc<MemoryWorld>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<LedgerEvent>,
    /// Set when memory could not be brought back in line with storage.
    poisoned: AtomicBool,
    config: NodeConfig,
}

impl Node {
    /// Open the node on the system clock.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, TallyError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open the node with an explicit clock.
    ///
    /// Restores the ledger and collaborator state from storage; an empty
    /// database starts from genesis.
    pub fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>, TallyError> {
        config.ledger.validate()?;
        let store = LedgerStore::open(config.db_path())?;
        let (state, world_state) = store.load()?;
        let world = Arc::new(MemoryWorld::from_state(world_state));
        let ledger = Ledger::with_state(
            config.ledger.clone(),
            clock.clone(),
            world.collaborators(),
            state,
        );

        info!(
            db = %config.db_path().display(),
            cycle = ledger.current_cycle(),
            last_known_cycle = ledger.state().accumulator.last_known_cycle(),
            positions = ledger.state().positions.len(),
            "ledger opened"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            ledger: Mutex::new(ledger),
            storage: RwLock::new(store),
            world,
            clock,
            events,
            poisoned: AtomicBool::new(false),
            config,
        }))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Whether the node stopped accepting operations after a failed reload.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn ensure_usable(&self) -> Result<(), TallyError> {
        if self.is_poisoned() {
            return Err(TallyError::Storage(
                "node state diverged from storage; restart required".into(),
            ));
        }
        Ok(())
    }

    /// Run a mutating ledger operation, then persist and publish its effects.
    fn apply<T>(
        &self,
        op: impl FnOnce(&mut Ledger) -> Result<T, LedgerError>,
    ) -> Result<T, TallyError> {
        let mut ledger = self.ledger.lock();
        self.ensure_usable()?;
        let value = op(&mut ledger)?;

        let changes = ledger.take_changes();
        let events = ledger.take_events();
        let written = self
            .storage
            .write()
            .write_changes(&changes, &self.world.snapshot());
        if let Err(e) = written {
            warn!(error = %e, "persisting ledger changes failed; reloading from storage");
            self.reload(&mut ledger)?;
            return Err(e);
        }
        debug!(
            cycles = changes.cycles.len(),
            positions = changes.positions.len(),
            "persisted ledger changes"
        );

        for event in events {
            info!(event = ?event, "ledger event");
            // No receivers is not an error.
            let _ = self.events.send(event);
        }
        Ok(value)
    }

    /// Replace the in-memory ledger and collaborators with what storage holds.
    fn reload(&self, ledger: &mut Ledger) -> Result<(), TallyError> {
        let loaded = self.storage.read().load();
        match loaded {
            Ok((state, world_state)) => {
                self.world.restore(world_state);
                *ledger = Ledger::with_state(
                    self.config.ledger.clone(),
                    self.clock.clone(),
                    self.world.collaborators(),
                    state,
                );
                info!(positions = ledger.state().positions.len(), "ledger reloaded from storage");
                Ok(())
            }
            Err(e) => {
                self.poisoned.store(true, Ordering::Release);
                error!(error = %e, "reloading ledger failed; refusing further operations");
                Err(e)
            }
        }
    }

    /// Change the collaborators outside a ledger operation and persist them.
    ///
    /// Holds the ledger lock so the snapshot cannot interleave with an
    /// operation's batch.
    fn update_world<T>(&self, change: impl FnOnce(&MemoryWorld) -> T) -> Result<T, TallyError> {
        let _ledger = self.ledger.lock();
        self.ensure_usable()?;
        let before = self.world.snapshot();
        let value = change(&self.world);
        if let Err(e) = self.storage.write().write_world(&self.world.snapshot()) {
            self.world.restore(before);
            return Err(e);
        }
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    pub fn create_position(
        &self,
        owner: &AccountId,
        deposit: DepositId,
        fee_paid: u64,
    ) -> Result<PositionId, TallyError> {
        self.apply(|ledger| ledger.create_position(owner, deposit, fee_paid))
    }

    pub fn stake(
        &self,
        caller: &AccountId,
        id: PositionId,
        amount: u64,
        fee_paid: u64,
    ) -> Result<(), TallyError> {
        self.apply(|ledger| ledger.stake(caller, id, amount, fee_paid))
    }

    pub fn unstake(&self, caller: &AccountId, id: PositionId, amount: u64) -> Result<(), TallyError> {
        self.apply(|ledger| ledger.unstake(caller, id, amount))
    }

    pub fn claim_fees(&self, caller: &AccountId, id: PositionId) -> Result<u64, TallyError> {
        self.apply(|ledger| ledger.claim_fees(caller, id))
    }

    pub fn redeem_deposit(&self, caller: &AccountId, id: PositionId) -> Result<(), TallyError> {
        self.apply(|ledger| ledger.redeem_deposit(caller, id))
    }

    pub fn resolve_base_power(&self, id: PositionId) -> Result<u128, TallyError> {
        self.apply(|ledger| ledger.resolve_base_power(id))
    }

    pub fn roll_forward(&self) -> Result<Cycle, TallyError> {
        self.apply(|ledger| ledger.roll_forward())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn cycle_status(&self) -> Result<CycleStatus, TallyError> {
        let ledger = self.ledger.lock();
        let cycle = ledger.current_cycle();
        Ok(CycleStatus {
            cycle,
            cycle_start: ledger.clock().cycle_start(cycle),
            cycle_length_secs: ledger.clock().cycle_length(),
            last_known_cycle: ledger.state().accumulator.last_known_cycle(),
            total_power: ledger.total_power()?,
            reward: ledger.reward_at(cycle)?,
            accrued_fees: ledger.cycle_accrued_fees(cycle),
        })
    }

    pub fn reward_at(&self, cycle: Cycle) -> Result<u128, TallyError> {
        Ok(self.ledger.lock().reward_at(cycle)?)
    }

    pub fn cycle_accrued_fees(&self, cycle: Cycle) -> u64 {
        self.ledger.lock().cycle_accrued_fees(cycle)
    }

    pub fn fees_per_power_accumulator(&self, cycle: Cycle) -> Result<u128, TallyError> {
        Ok(self.ledger.lock().fees_per_power_accumulator(cycle)?)
    }

    pub fn position(&self, id: PositionId) -> Result<PositionView, TallyError> {
        let ledger = self.ledger.lock();
        Ok(PositionView {
            position: ledger.position(id)?.clone(),
            owner: self.world.owner_of(id),
            base_power: ledger.base_power(id)?,
            current_power: ledger.current_power(id)?,
            withdrawable_stake: ledger.withdrawable_stake(id)?,
        })
    }

    pub fn claimable_fees(&self, id: PositionId) -> Result<Claimable, TallyError> {
        Ok(self.ledger.lock().claimable_fees(id)?)
    }

    // ------------------------------------------------------------------
    // Collaborator helpers
    // ------------------------------------------------------------------

    /// Issue a deposit to `owner` in the in-memory custodian.
    pub fn mint_deposit(
        &self,
        owner: AccountId,
        weight: u64,
        matures_at: i64,
    ) -> Result<DepositId, TallyError> {
        let id = self.update_world(|world| world.mint_deposit(owner, weight, matures_at))?;
        info!(deposit = %id, owner = %owner, weight, matures_at, "deposit minted");
        Ok(id)
    }

    /// Credit stake token and fee currency to `account`.
    pub fn fund_account(&self, account: AccountId, stake: u64, fees: u64) -> Result<(), TallyError> {
        self.update_world(|world| {
            world.fund_stake(&account, stake);
            world.fund_fees(&account, fees);
        })?;
        info!(account = %account, stake, fees, "account funded");
        Ok(())
    }

    pub fn stake_balance(&self, account: &AccountId) -> u64 {
        self.world.stake_balance(account)
    }

    pub fn fee_balance(&self, account: &AccountId) -> u64 {
        self.world.fee_balance(account)
    }

    /// Flush storage to disk.
    pub fn flush(&self) -> Result<(), TallyError> {
        self.storage.read().flush()
    }
}
