//! Position records and the position ledger.
//!
//! A position's base power is its pro-rata share of its entry cycle's reward:
//! `entry_weight * R(entry) / total_entry_power[entry]`. The share is only
//! known once the entry cycle has ended, so it is resolved lazily by the first
//! operation that touches the position afterwards.
//!
//! Power over time is kept as an append-only list of [`PowerSegment`]s. Each
//! segment records the staked amount and redemption state effective from its
//! `from_cycle`; the power it yields is derived from the base power.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tally_core::constants::{MIN_BASE_POWER, STAKE_UNIT};
use tally_core::error::LedgerError;
use tally_core::types::{Cycle, DepositId, PositionId};

use crate::reward::RewardSchedule;

/// Power inputs effective from `from_cycle` until the next segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
pub struct PowerSegment {
    pub from_cycle: Cycle,
    pub staked: u64,
    pub redeemed: bool,
}

impl PowerSegment {
    /// Power of this segment for a position with `base_power`.
    ///
    /// Redemption cuts the base to [`MIN_BASE_POWER`]; extra power is
    /// `base * staked / STAKE_UNIT`, floored.
    pub fn power(&self, base_power: u128) -> Result<u128, LedgerError> {
        let base = if self.redeemed { MIN_BASE_POWER } else { base_power };
        let extra = base
            .checked_mul(self.staked as u128)
            .ok_or(LedgerError::ArithmeticOverflow)?
            / STAKE_UNIT as u128;
        base.checked_add(extra).ok_or(LedgerError::ArithmeticOverflow)
    }
}

/// A claim record created from a deposit. Never destroyed.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
pub struct Position {
    pub id: PositionId,
    pub deposit: DepositId,
    pub entry_cycle: Cycle,
    /// Zero for positions created from an already redeemed deposit.
    pub entry_weight: u64,
    /// `None` until the entry cycle has ended and the share is resolved.
    pub base_power: Option<u128>,
    pub staked_amount: u64,
    /// Principal that may be unstaked now.
    pub withdrawable_stake: u64,
    /// Principal staked in `maturing_since`, withdrawable from the next cycle.
    pub maturing_stake: u64,
    pub maturing_since: Cycle,
    pub last_stake_change_cycle: Option<Cycle>,
    pub redeemed: bool,
    pub segments: Vec<PowerSegment>,
    pub last_claimed_cycle: Option<Cycle>,
}

impl Position {
    /// A fresh position entering in `cycle`.
    ///
    /// Positions over an already redeemed deposit start at
    /// [`MIN_BASE_POWER`] with no entry weight.
    pub fn new(
        id: PositionId,
        deposit: DepositId,
        cycle: Cycle,
        entry_weight: u64,
        redeemed: bool,
    ) -> Self {
        Self {
            id,
            deposit,
            entry_cycle: cycle,
            entry_weight: if redeemed { 0 } else { entry_weight },
            base_power: redeemed.then_some(MIN_BASE_POWER),
            staked_amount: 0,
            withdrawable_stake: 0,
            maturing_stake: 0,
            maturing_since: cycle,
            last_stake_change_cycle: None,
            redeemed,
            segments: vec![PowerSegment {
                from_cycle: cycle,
                staked: 0,
                redeemed,
            }],
            last_claimed_cycle: None,
        }
    }

    /// Segment in effect during `cycle`.
    pub fn segment_at(&self, cycle: Cycle) -> PowerSegment {
        self.segments
            .iter()
            .rev()
            .find(|s| s.from_cycle <= cycle)
            .or_else(|| self.segments.first())
            .copied()
            .unwrap_or(PowerSegment {
                from_cycle: self.entry_cycle,
                staked: 0,
                redeemed: self.redeemed,
            })
    }

    /// Latest segment, i.e. the power inputs once all scheduled changes apply.
    pub fn latest_segment(&self) -> PowerSegment {
        self.segment_at(Cycle::MAX)
    }

    /// Power during `cycle`, or `None` while the base power is unresolved.
    pub fn power_at(&self, base_power: Option<u128>, cycle: Cycle) -> Result<Option<u128>, LedgerError> {
        match base_power {
            Some(base) => self.segment_at(cycle).power(base).map(Some),
            None => Ok(None),
        }
    }

    /// Principal withdrawable during `cycle`.
    pub fn withdrawable_at(&self, cycle: Cycle) -> u64 {
        if self.maturing_since < cycle {
            self.withdrawable_stake.saturating_add(self.maturing_stake)
        } else {
            self.withdrawable_stake
        }
    }

    /// Move matured principal into the withdrawable balance.
    pub fn mature(&mut self, cycle: Cycle) {
        if self.maturing_stake > 0 && self.maturing_since < cycle {
            self.withdrawable_stake = self.withdrawable_at(cycle);
            self.maturing_stake = 0;
        }
    }

    /// Record a segment starting at `segment.from_cycle`. A segment already
    /// starting there is replaced, so changes within one cycle accumulate.
    pub fn push_segment(&mut self, segment: PowerSegment) {
        match self.segments.last_mut() {
            Some(last) if last.from_cycle == segment.from_cycle => *last = segment,
            _ => self.segments.push(segment),
        }
    }

    /// Drop segments that end before `cycle`.
    pub fn compact(&mut self, cycle: Cycle) {
        let keep_from = self
            .segments
            .iter()
            .rposition(|s| s.from_cycle <= cycle)
            .unwrap_or(0);
        self.segments.drain(..keep_from);
    }
}

/// All positions plus the per-cycle entry aggregates used to resolve them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionLedger {
    positions: BTreeMap<PositionId, Position>,
    /// Sum of entry weights of the positions created in each cycle.
    entry_power: BTreeMap<Cycle, u128>,
    /// `sum(entry_weight * amount)` of stakes made by positions during their
    /// own entry cycle, before their base power is known.
    entry_stake_weight: BTreeMap<Cycle, u128>,
}

impl PositionLedger {
    pub fn get(&self, id: PositionId) -> Result<&Position, LedgerError> {
        self.positions
            .get(&id)
            .ok_or(LedgerError::UnknownPosition(id.0))
    }

    pub(crate) fn get_mut(&mut self, id: PositionId) -> Option<&mut Position> {
        self.positions.get_mut(&id)
    }

    pub(crate) fn insert(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of entry weights of positions created in `cycle`.
    pub fn total_entry_power(&self, cycle: Cycle) -> u128 {
        self.entry_power.get(&cycle).copied().unwrap_or(0)
    }

    pub fn entry_stake_weight(&self, cycle: Cycle) -> u128 {
        self.entry_stake_weight.get(&cycle).copied().unwrap_or(0)
    }

    pub(crate) fn set_total_entry_power(&mut self, cycle: Cycle, power: u128) {
        if power == 0 {
            self.entry_power.remove(&cycle);
        } else {
            self.entry_power.insert(cycle, power);
        }
    }

    pub(crate) fn set_entry_stake_weight(&mut self, cycle: Cycle, weight: u128) {
        if weight == 0 {
            self.entry_stake_weight.remove(&cycle);
        } else {
            self.entry_stake_weight.insert(cycle, weight);
        }
    }

    /// `entry_weight * R(entry) / total_entry_power[entry]`.
    pub fn compute_base_power(
        &self,
        position: &Position,
        rewards: &RewardSchedule,
    ) -> Result<u128, LedgerError> {
        let total = self.total_entry_power(position.entry_cycle);
        if total == 0 {
            return Err(LedgerError::ArithmeticOverflow);
        }
        let reward = rewards.reward_at(position.entry_cycle)?;
        Ok((position.entry_weight as u128)
            .checked_mul(reward)
            .ok_or(LedgerError::ArithmeticOverflow)?
            / total)
    }

    /// Base power as seen during `current`: the stored value, the lazily
    /// resolved value once the entry cycle has ended, or `None` before that.
    pub fn base_power_for(
        &self,
        position: &Position,
        rewards: &RewardSchedule,
        current: Cycle,
    ) -> Result<Option<u128>, LedgerError> {
        match position.base_power {
            Some(base) => Ok(Some(base)),
            None if current > position.entry_cycle => {
                self.compute_base_power(position, rewards).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Resolve and store the base power of `id`.
    ///
    /// Fails with `AlreadyResolved` if it was stored before, and with
    /// `EntryCyclePending` while its entry cycle is still running.
    pub fn resolve_base_power(
        &mut self,
        id: PositionId,
        rewards: &RewardSchedule,
        current: Cycle,
    ) -> Result<u128, LedgerError> {
        let position = self.get(id)?;
        if position.base_power.is_some() {
            return Err(LedgerError::AlreadyResolved(id.0));
        }
        if current <= position.entry_cycle {
            return Err(LedgerError::EntryCyclePending(position.entry_cycle));
        }
        let base = self.compute_base_power(position, rewards)?;
        if let Some(position) = self.positions.get_mut(&id) {
            position.base_power = Some(base);
        }
        Ok(base)
    }

    /// Aggregate extra power of entry-cycle stakes made in `cycle`:
    /// `R(cycle) * entry_stake_weight / (total_entry_power * STAKE_UNIT)`.
    ///
    /// Never less than the sum of the individual extra powers, which are each
    /// floored from the same quantity.
    pub fn entry_fold(&self, cycle: Cycle, rewards: &RewardSchedule) -> Result<i128, LedgerError> {
        let weight = self.entry_stake_weight(cycle);
        if weight == 0 {
            return Ok(0);
        }
        let reward = rewards.reward_at(cycle)?;
        let denom = self
            .total_entry_power(cycle)
            .checked_mul(STAKE_UNIT as u128)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if denom == 0 {
            return Err(LedgerError::ArithmeticOverflow);
        }
        let extra = reward
            .checked_mul(weight)
            .ok_or(LedgerError::ArithmeticOverflow)?
            / denom;
        i128::try_from(extra).map_err(|_| LedgerError::ArithmeticOverflow)
    }

    pub(crate) fn entry_cycles(&self) -> impl Iterator<Item = Cycle> + '_ {
        self.entry_power.keys().chain(self.entry_stake_weight.keys()).copied()
    }
}
