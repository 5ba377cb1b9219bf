//! The ledger: composes the cycle clock, reward schedule, fee accumulator,
//! and position ledger behind the boundary operations.
//!
//! Every operation follows the same order:
//! 1. validate and project the roll-forward to the current cycle, computing
//!    every new value with checked arithmetic;
//! 2. run the fallible inbound collaborator calls (fee receipt, custody,
//!    stake pull), returning the received fee if a later one fails;
//! 3. commit the projection and the planned values, which cannot fail;
//! 4. run the outbound collaborator calls (payouts, refunds, releases).
//!
//! A failed operation therefore leaves the state untouched.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use tally_core::constants::MIN_BASE_POWER;
use tally_core::error::LedgerError;
use tally_core::fees::{protocol_cut, required_entry_fee, required_stake_fee};
use tally_core::traits::{Clock, DepositCustody, FeeChannel, PositionRegistry, StakeToken};
use tally_core::types::{AccountId, Cycle, DepositId, LedgerEvent, PositionId};

use crate::accumulator::Projection;
use crate::claims::{self, Claimable};
use crate::clock::CycleClock;
use crate::params::LedgerParams;
use crate::positions::{Position, PowerSegment};
use crate::stakes::{self, PowerChange};
use crate::state::{ChangeSet, LedgerState};

/// The external systems the ledger moves value through.
#[derive(Clone)]
pub struct Collaborators {
    pub custody: Arc<dyn DepositCustody>,
    pub stake_token: Arc<dyn StakeToken>,
    pub registry: Arc<dyn PositionRegistry>,
    pub fee_channel: Arc<dyn FeeChannel>,
}

/// Where a planned power change is recorded.
enum ScheduledChange {
    /// New pending delta at the effective cycle.
    Pending(Cycle, i128),
    /// New entry stake weight of the entry cycle.
    EntryWeight(Cycle, u128),
}

pub struct Ledger {
    params: LedgerParams,
    clock: CycleClock,
    state: LedgerState,
    collaborators: Collaborators,
    events: Vec<LedgerEvent>,
    touched_cycles: BTreeSet<Cycle>,
    touched_positions: BTreeSet<PositionId>,
}

impl Ledger {
    /// A ledger with empty state.
    pub fn new(params: LedgerParams, clock: Arc<dyn Clock>, collaborators: Collaborators) -> Self {
        Self::with_state(params, clock, collaborators, LedgerState::default())
    }

    /// A ledger resuming from previously persisted state.
    pub fn with_state(
        params: LedgerParams,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
        state: LedgerState,
    ) -> Self {
        let clock = CycleClock::new(params.genesis_time, params.cycle_length_secs, clock);
        Self {
            params,
            clock,
            state,
            collaborators,
            events: Vec::new(),
            touched_cycles: BTreeSet::new(),
            touched_positions: BTreeSet::new(),
        }
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub fn clock(&self) -> &CycleClock {
        &self.clock
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Current cycle. Never behind the last cycle the ledger materialized,
    /// even if the wall clock steps backwards.
    pub fn current_cycle(&self) -> Cycle {
        self.clock
            .current_cycle()
            .max(self.state.accumulator.last_known_cycle())
    }

    /// Drain the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain the records touched since the last call.
    pub fn take_changes(&mut self) -> ChangeSet {
        let cycles = std::mem::take(&mut self.touched_cycles)
            .into_iter()
            .map(|c| (c, self.state.cycle_record(c)))
            .collect();
        let positions = std::mem::take(&mut self.touched_positions)
            .into_iter()
            .filter_map(|id| self.state.positions.get(id).ok().cloned())
            .collect();
        ChangeSet {
            meta: self.state.meta(),
            cycles,
            positions,
        }
    }

    // ------------------------------------------------------------------
    // Roll-forward
    // ------------------------------------------------------------------

    fn project(&self) -> Result<Projection, LedgerError> {
        let to = self.current_cycle();
        let last = self.state.accumulator.last_known_cycle();
        let fold = if to > last {
            self.state.positions.entry_fold(last, &self.state.rewards)?
        } else {
            0
        };
        self.state.accumulator.project(to, fold)
    }

    fn commit_roll(&mut self, proj: &Projection) {
        if let Some((at, _)) = proj.checkpoint {
            debug!(
                from = self.state.accumulator.last_known_cycle(),
                to = proj.cycle,
                total_power = %proj.total_power,
                "rolled forward"
            );
            self.touched_cycles.insert(at);
        }
        self.state.accumulator.commit(proj);
    }

    /// Materialize the global state at the current cycle.
    pub fn roll_forward(&mut self) -> Result<Cycle, LedgerError> {
        let proj = self.project()?;
        self.commit_roll(&proj);
        Ok(proj.cycle)
    }

    // ------------------------------------------------------------------
    // Boundary operations
    // ------------------------------------------------------------------

    /// Create a position for `owner` from `deposit`, paying `fee_paid`.
    ///
    /// `fee_paid` is taken from `owner` through the fee channel. The required
    /// fee is split between the treasury and the current cycle's fee pool;
    /// any overpayment is refunded.
    pub fn create_position(
        &mut self,
        owner: &AccountId,
        deposit: DepositId,
        fee_paid: u64,
    ) -> Result<PositionId, LedgerError> {
        let terms = self.collaborators.custody.terms(deposit)?;
        if terms.owner != *owner {
            return Err(LedgerError::NotOwner(format!("deposit {deposit}")));
        }
        if terms.in_custody {
            return Err(LedgerError::DepositInUse(deposit.0));
        }
        let weight = if terms.redeemed { 0 } else { terms.weight };
        if !terms.redeemed && weight == 0 {
            return Err(LedgerError::InvalidAmount("deposit carries no weight".into()));
        }
        let required = required_entry_fee(weight);
        if fee_paid < required {
            return Err(LedgerError::InsufficientFee {
                paid: fee_paid,
                required,
            });
        }

        let proj = self.project()?;
        let cycle = proj.cycle;
        let treasury_cut = protocol_cut(required, self.params.protocol_fee_bps);
        let fee_accrued = required - treasury_cut;
        let refund = fee_paid - required;
        let fees = self.state.accumulator.fees_with(cycle, fee_accrued)?;

        let prior_entry = self.state.positions.total_entry_power(cycle);
        let (entry_power, total_power, reward) = if terms.redeemed {
            let total = proj
                .total_power
                .checked_add(MIN_BASE_POWER)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            (prior_entry, total, None)
        } else {
            let reward = self.state.rewards.reward_at(cycle)?;
            // The cycle's emission enters total power once, with its first entrant.
            let total = if prior_entry == 0 {
                proj.total_power
                    .checked_add(reward)
                    .ok_or(LedgerError::ArithmeticOverflow)?
            } else {
                proj.total_power
            };
            let entry = prior_entry
                .checked_add(weight as u128)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            (entry, total, Some(reward))
        };

        self.collaborators.fee_channel.receive(owner, fee_paid)?;
        if let Err(e) = self.collaborators.custody.take_custody(deposit, owner) {
            self.collaborators.fee_channel.credit(owner, fee_paid);
            return Err(e);
        }
        let id = self.collaborators.registry.mint(owner);

        self.commit_roll(&proj);
        if let Some(reward) = reward {
            self.state.rewards.record(cycle, reward);
        }
        self.state.accumulator.set_total_power(total_power);
        self.state.accumulator.set_accrued_fees(cycle, fees);
        self.state.positions.set_total_entry_power(cycle, entry_power);
        self.state
            .positions
            .insert(Position::new(id, deposit, cycle, weight, terms.redeemed));
        self.touched_cycles.insert(cycle);
        self.touched_positions.insert(id);

        info!(
            position = %id,
            owner = %owner,
            deposit = %deposit,
            cycle,
            weight,
            redeemed = terms.redeemed,
            "position created"
        );
        self.events.push(LedgerEvent::PositionCreated {
            position: id,
            owner: *owner,
            deposit,
            cycle,
            entry_weight: weight,
            fee_accrued,
            treasury_cut,
            refund,
        });

        if treasury_cut > 0 {
            self.collaborators
                .fee_channel
                .credit(&self.params.treasury, treasury_cut);
        }
        if refund > 0 {
            self.collaborators.fee_channel.credit(owner, refund);
        }
        Ok(id)
    }

    /// Stake `amount` into position `id`. Power changes from the next cycle.
    pub fn stake(
        &mut self,
        caller: &AccountId,
        id: PositionId,
        amount: u64,
        fee_paid: u64,
    ) -> Result<(), LedgerError> {
        let position = self.state.positions.get(id)?;
        self.collaborators.registry.ensure_owner(id, caller)?;

        let proj = self.project()?;
        let cycle = proj.cycle;
        let base = self
            .state
            .positions
            .base_power_for(position, &self.state.rewards, cycle)?;
        let plan = stakes::plan_stake(position, base, amount, cycle)?;
        let required = required_stake_fee(amount);
        if fee_paid < required {
            return Err(LedgerError::InsufficientFee {
                paid: fee_paid,
                required,
            });
        }
        let refund = fee_paid - required;
        let fees = self.state.accumulator.fees_with(cycle, required)?;
        let resolved = if position.base_power.is_none() { base } else { None };
        let scheduled = match plan.change {
            PowerChange::Exact(delta) => {
                let at = plan.effective_cycle();
                ScheduledChange::Pending(at, self.state.accumulator.pending_with(at, delta)?)
            }
            PowerChange::EntryWeighted(weight) => {
                let at = position.entry_cycle;
                let total = self
                    .state
                    .positions
                    .entry_stake_weight(at)
                    .checked_add(weight)
                    .ok_or(LedgerError::ArithmeticOverflow)?;
                ScheduledChange::EntryWeight(at, total)
            }
        };

        self.collaborators.fee_channel.receive(caller, fee_paid)?;
        if let Err(e) = self.collaborators.stake_token.transfer_from(caller, amount) {
            self.collaborators.fee_channel.credit(caller, fee_paid);
            return Err(e);
        }

        self.commit_roll(&proj);
        self.apply_scheduled(scheduled);
        self.state.accumulator.set_accrued_fees(cycle, fees);
        self.touched_cycles.insert(cycle);
        if let Some(position) = self.state.positions.get_mut(id) {
            if resolved.is_some() {
                position.base_power = resolved;
            }
            plan.apply(position, cycle);
        }
        self.touched_positions.insert(id);

        info!(position = %id, amount, cycle, effective = plan.effective_cycle(), "staked");
        self.events.push(LedgerEvent::Staked {
            position: id,
            amount,
            fee_accrued: required,
            refund,
            cycle,
            effective_cycle: plan.effective_cycle(),
        });

        if refund > 0 {
            self.collaborators.fee_channel.credit(caller, refund);
        }
        Ok(())
    }

    /// Withdraw `amount` of matured principal from position `id`. Power
    /// drops from the next cycle.
    pub fn unstake(
        &mut self,
        caller: &AccountId,
        id: PositionId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let position = self.state.positions.get(id)?;
        self.collaborators.registry.ensure_owner(id, caller)?;

        let proj = self.project()?;
        let cycle = proj.cycle;
        let base = self
            .state
            .positions
            .base_power_for(position, &self.state.rewards, cycle)?;
        let plan = stakes::plan_unstake(position, base, amount, cycle)?;
        let resolved = if position.base_power.is_none() { base } else { None };
        let at = plan.effective_cycle();
        let delta = match plan.change {
            PowerChange::Exact(delta) => delta,
            PowerChange::EntryWeighted(_) => return Err(LedgerError::EntryCyclePending(cycle)),
        };
        let pending = self.state.accumulator.pending_with(at, delta)?;

        self.commit_roll(&proj);
        self.apply_scheduled(ScheduledChange::Pending(at, pending));
        if let Some(position) = self.state.positions.get_mut(id) {
            if resolved.is_some() {
                position.base_power = resolved;
            }
            plan.apply(position, cycle);
        }
        self.touched_positions.insert(id);

        info!(position = %id, amount, cycle, effective = at, "unstaked");
        self.events.push(LedgerEvent::Unstaked {
            position: id,
            amount,
            cycle,
            effective_cycle: at,
        });

        self.collaborators.stake_token.transfer(caller, amount);
        Ok(())
    }

    /// Pay out all fees position `id` earned through the last elapsed cycle.
    pub fn claim_fees(&mut self, caller: &AccountId, id: PositionId) -> Result<u64, LedgerError> {
        let position = self.state.positions.get(id)?;
        self.collaborators.registry.ensure_owner(id, caller)?;

        let proj = self.project()?;
        let base = self
            .state
            .positions
            .base_power_for(position, &self.state.rewards, proj.cycle)?;
        let accumulator = &self.state.accumulator;
        let claim = claims::claimable(position, base, proj.cycle, |k| accumulator.acc_at(&proj, k))?;
        let amount = claim.total()?;
        let through = match claim.through_cycle {
            Some(through) if amount > 0 => through,
            _ => return Err(LedgerError::NothingToClaim(id.0)),
        };
        let resolved = if position.base_power.is_none() { base } else { None };

        self.commit_roll(&proj);
        if let Some(position) = self.state.positions.get_mut(id) {
            if resolved.is_some() {
                position.base_power = resolved;
            }
            position.last_claimed_cycle = Some(through);
            position.compact(through + 1);
        }
        self.touched_positions.insert(id);

        info!(position = %id, amount, through, "fees claimed");
        self.events.push(LedgerEvent::FeesClaimed {
            position: id,
            owner: *caller,
            amount,
            through_cycle: through,
        });

        self.collaborators.fee_channel.credit(caller, amount);
        Ok(amount)
    }

    /// Redeem the deposit underlying position `id`. Base power drops to
    /// [`MIN_BASE_POWER`] from the next cycle; staked extra power then
    /// applies to the reduced base.
    pub fn redeem_deposit(&mut self, caller: &AccountId, id: PositionId) -> Result<(), LedgerError> {
        let position = self.state.positions.get(id)?;
        self.collaborators.registry.ensure_owner(id, caller)?;
        if position.redeemed {
            return Err(LedgerError::AlreadyRedeemed(id.0));
        }

        let proj = self.project()?;
        let cycle = proj.cycle;
        let base = self
            .state
            .positions
            .base_power_for(position, &self.state.rewards, cycle)?
            .ok_or(LedgerError::EntryCyclePending(position.entry_cycle))?;
        let deposit = position.deposit;
        if !self
            .collaborators
            .custody
            .is_redeemable(deposit, self.clock.now())
        {
            return Err(LedgerError::NotRedeemable(deposit.0));
        }
        let current = position.latest_segment();
        let segment = PowerSegment {
            from_cycle: cycle.checked_add(1).ok_or(LedgerError::ArithmeticOverflow)?,
            staked: current.staked,
            redeemed: true,
        };
        let delta = stakes::power_change(base, &current, &segment)?;
        let at = segment.from_cycle;
        let pending = self.state.accumulator.pending_with(at, delta)?;
        let resolved = position.base_power.is_none();

        self.commit_roll(&proj);
        self.apply_scheduled(ScheduledChange::Pending(at, pending));
        if let Some(position) = self.state.positions.get_mut(id) {
            if resolved {
                position.base_power = Some(base);
            }
            position.redeemed = true;
            position.push_segment(segment);
        }
        self.touched_positions.insert(id);

        info!(position = %id, deposit = %deposit, cycle, effective = at, "deposit redeemed");
        self.events.push(LedgerEvent::DepositRedeemed {
            position: id,
            deposit,
            cycle,
            effective_cycle: at,
        });

        self.collaborators.custody.redeem(deposit, caller);
        Ok(())
    }

    /// Resolve and store the base power of position `id`.
    ///
    /// Other operations resolve lazily; calling this explicitly on a resolved
    /// position fails with `AlreadyResolved`.
    pub fn resolve_base_power(&mut self, id: PositionId) -> Result<u128, LedgerError> {
        let position = self.state.positions.get(id)?;
        let proj = self.project()?;
        if position.base_power.is_some() {
            return Err(LedgerError::AlreadyResolved(id.0));
        }
        if proj.cycle <= position.entry_cycle {
            return Err(LedgerError::EntryCyclePending(position.entry_cycle));
        }
        self.state
            .positions
            .compute_base_power(position, &self.state.rewards)?;

        self.commit_roll(&proj);
        let base = self
            .state
            .positions
            .resolve_base_power(id, &self.state.rewards, proj.cycle)?;
        self.touched_positions.insert(id);
        debug!(position = %id, base = %base, "base power resolved");
        Ok(base)
    }

    fn apply_scheduled(&mut self, change: ScheduledChange) {
        match change {
            ScheduledChange::Pending(at, delta) => {
                self.state.accumulator.set_pending_delta(at, delta);
                self.touched_cycles.insert(at);
            }
            ScheduledChange::EntryWeight(at, weight) => {
                self.state.positions.set_entry_stake_weight(at, weight);
                self.touched_cycles.insert(at);
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Reward emission of `cycle`.
    pub fn reward_at(&self, cycle: Cycle) -> Result<u128, LedgerError> {
        self.state.rewards.reward_at(cycle)
    }

    /// Fees accrued to the pool during `cycle`.
    pub fn cycle_accrued_fees(&self, cycle: Cycle) -> u64 {
        self.state.accumulator.accrued_fees(cycle)
    }

    pub fn position(&self, id: PositionId) -> Result<&Position, LedgerError> {
        self.state.positions.get(id)
    }

    /// Base power of `id`, or `None` while its entry cycle is running.
    pub fn base_power(&self, id: PositionId) -> Result<Option<u128>, LedgerError> {
        let position = self.state.positions.get(id)?;
        self.state
            .positions
            .base_power_for(position, &self.state.rewards, self.current_cycle())
    }

    /// Power of `id` during the current cycle, or `None` while its entry
    /// cycle is running.
    pub fn current_power(&self, id: PositionId) -> Result<Option<u128>, LedgerError> {
        let position = self.state.positions.get(id)?;
        let cycle = self.current_cycle();
        let base = self
            .state
            .positions
            .base_power_for(position, &self.state.rewards, cycle)?;
        position.power_at(base, cycle)
    }

    /// Principal of `id` that may be unstaked now.
    pub fn withdrawable_stake(&self, id: PositionId) -> Result<u64, LedgerError> {
        let position = self.state.positions.get(id)?;
        Ok(position.withdrawable_at(self.current_cycle()))
    }

    /// Accumulator value at `cycle`, capped at the current cycle.
    pub fn fees_per_power_accumulator(&self, cycle: Cycle) -> Result<u128, LedgerError> {
        let proj = self.project()?;
        Ok(self.state.accumulator.acc_at(&proj, cycle.min(proj.cycle)))
    }

    /// What `id` could claim right now.
    pub fn claimable_fees(&self, id: PositionId) -> Result<Claimable, LedgerError> {
        let position = self.state.positions.get(id)?;
        let proj = self.project()?;
        let base = self
            .state
            .positions
            .base_power_for(position, &self.state.rewards, proj.cycle)?;
        let accumulator = &self.state.accumulator;
        claims::claimable(position, base, proj.cycle, |k| accumulator.acc_at(&proj, k))
    }

    /// Total power effective during the current cycle.
    pub fn total_power(&self) -> Result<u128, LedgerError> {
        Ok(self.project()?.total_power)
    }
}
