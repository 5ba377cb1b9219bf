//! Per-cycle fee accrual and the cumulative fees-per-power accumulator.
//!
//! `acc(k)` is the scaled sum of `fees[c] * SCALING_FACTOR / total_power[c]`
//! over every cycle `c < k`. Values are stored sparsely: a checkpoint is
//! written at `L + 1` whenever the ledger rolls past cycle `L`, and `acc(k)`
//! reads the latest checkpoint at or before `k`. Skipped cycles carry no fees
//! and therefore need no entry.
//!
//! Rolling forward is split into [`FeeAccumulator::project`], which computes
//! the rolled state with checked arithmetic and mutates nothing, and
//! [`FeeAccumulator::commit`], which cannot fail. Operations project first,
//! validate against the projection, and commit only once nothing can fail.

use std::collections::BTreeMap;

use tally_core::constants::SCALING_FACTOR;
use tally_core::error::LedgerError;
use tally_core::types::Cycle;

/// Rolled-forward global state, not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Cycle the state was rolled to.
    pub cycle: Cycle,
    /// Total power effective in `cycle`.
    pub total_power: u128,
    /// Accumulator checkpoint created by the roll, if any cycles elapsed.
    pub checkpoint: Option<(Cycle, u128)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeAccumulator {
    last_known_cycle: Cycle,
    total_power: u128,
    fees: BTreeMap<Cycle, u64>,
    checkpoints: BTreeMap<Cycle, u128>,
    pending: BTreeMap<Cycle, i128>,
}

/// Apply a signed delta to a power total.
pub(crate) fn apply_delta(total: u128, delta: i128) -> Result<u128, LedgerError> {
    if delta >= 0 {
        total.checked_add(delta as u128)
    } else {
        total.checked_sub(delta.unsigned_abs())
    }
    .ok_or(LedgerError::ArithmeticOverflow)
}

impl FeeAccumulator {
    pub fn last_known_cycle(&self) -> Cycle {
        self.last_known_cycle
    }

    /// Total power effective at the last known cycle.
    pub fn total_power(&self) -> u128 {
        self.total_power
    }

    /// Fees accrued during `cycle`.
    pub fn accrued_fees(&self, cycle: Cycle) -> u64 {
        self.fees.get(&cycle).copied().unwrap_or(0)
    }

    /// Power change scheduled to take effect at `cycle`.
    pub fn pending_delta(&self, cycle: Cycle) -> i128 {
        self.pending.get(&cycle).copied().unwrap_or(0)
    }

    /// Checkpoint stored exactly at `cycle`, if any.
    pub fn checkpoint(&self, cycle: Cycle) -> Option<u128> {
        self.checkpoints.get(&cycle).copied()
    }

    /// Committed accumulator value at `cycle`.
    pub fn committed_acc(&self, cycle: Cycle) -> u128 {
        self.checkpoints
            .range(..=cycle)
            .next_back()
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Accumulator value at `cycle` as seen through `proj`.
    pub fn acc_at(&self, proj: &Projection, cycle: Cycle) -> u128 {
        match proj.checkpoint {
            // The projected checkpoint is newer than every committed one.
            Some((at, value)) if cycle >= at => value,
            _ => self.committed_acc(cycle),
        }
    }

    /// Roll the global state forward to `to` without mutating anything.
    ///
    /// Only the last known cycle `L` can hold fees, since any activity in a
    /// later cycle would have rolled the state there first. The accumulator
    /// therefore gains a single increment for `L`, pending power deltas in
    /// `(L, to]` are applied to the total, and `entry_fold` (extra power of
    /// stakes made by unresolved entrants of `L`) is added as well.
    pub fn project(&self, to: Cycle, entry_fold: i128) -> Result<Projection, LedgerError> {
        let last = self.last_known_cycle;
        if to <= last {
            return Ok(Projection {
                cycle: last,
                total_power: self.total_power,
                checkpoint: None,
            });
        }

        let increment = if self.total_power == 0 {
            0
        } else {
            (self.accrued_fees(last) as u128)
                .checked_mul(SCALING_FACTOR)
                .ok_or(LedgerError::ArithmeticOverflow)?
                / self.total_power
        };
        let next_acc = self
            .committed_acc(last)
            .checked_add(increment)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let mut delta = entry_fold;
        for (_, d) in self.pending.range(last + 1..=to) {
            delta = delta.checked_add(*d).ok_or(LedgerError::ArithmeticOverflow)?;
        }
        let total_power = apply_delta(self.total_power, delta)?;

        Ok(Projection {
            cycle: to,
            total_power,
            checkpoint: Some((last + 1, next_acc)),
        })
    }

    /// Commit a projection produced by [`project`](Self::project).
    pub fn commit(&mut self, proj: &Projection) {
        if let Some((at, value)) = proj.checkpoint {
            self.checkpoints.insert(at, value);
        }
        self.last_known_cycle = self.last_known_cycle.max(proj.cycle);
        self.total_power = proj.total_power;
    }

    pub(crate) fn set_total_power(&mut self, power: u128) {
        self.total_power = power;
    }

    pub(crate) fn set_accrued_fees(&mut self, cycle: Cycle, fees: u64) {
        if fees == 0 {
            self.fees.remove(&cycle);
        } else {
            self.fees.insert(cycle, fees);
        }
    }

    pub(crate) fn set_pending_delta(&mut self, cycle: Cycle, delta: i128) {
        if delta == 0 {
            self.pending.remove(&cycle);
        } else {
            self.pending.insert(cycle, delta);
        }
    }

    pub(crate) fn set_checkpoint(&mut self, cycle: Cycle, value: u128) {
        self.checkpoints.insert(cycle, value);
    }

    pub(crate) fn set_last_known(&mut self, cycle: Cycle, total_power: u128) {
        self.last_known_cycle = cycle;
        self.total_power = total_power;
    }

    pub(crate) fn cycles(&self) -> impl Iterator<Item = Cycle> + '_ {
        self.fees
            .keys()
            .chain(self.checkpoints.keys())
            .chain(self.pending.keys())
            .copied()
    }

    /// Fees accrued in `cycle` after adding `amount`.
    pub(crate) fn fees_with(&self, cycle: Cycle, amount: u64) -> Result<u64, LedgerError> {
        self.accrued_fees(cycle)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Pending delta at `cycle` after adding `delta`.
    pub(crate) fn pending_with(&self, cycle: Cycle, delta: i128) -> Result<i128, LedgerError> {
        self.pending_delta(cycle)
            .checked_add(delta)
            .ok_or(LedgerError::ArithmeticOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_power(power: u128) -> FeeAccumulator {
        let mut acc = FeeAccumulator::default();
        acc.set_total_power(power);
        acc
    }

    #[test]
    fn no_roll_within_cycle() {
        let acc = with_power(10);
        let proj = acc.project(0, 0).unwrap();
        assert_eq!(proj.cycle, 0);
        assert_eq!(proj.total_power, 10);
        assert_eq!(proj.checkpoint, None);
    }

    #[test]
    fn roll_adds_fee_increment() {
        let mut acc = with_power(4);
        acc.set_accrued_fees(0, 2);
        let proj = acc.project(1, 0).unwrap();
        assert_eq!(proj.checkpoint, Some((1, 2 * SCALING_FACTOR / 4)));
        acc.commit(&proj);
        assert_eq!(acc.last_known_cycle(), 1);
        assert_eq!(acc.committed_acc(0), 0);
        assert_eq!(acc.committed_acc(1), SCALING_FACTOR / 2);
    }

    #[test]
    fn zero_power_gives_zero_increment() {
        let mut acc = FeeAccumulator::default();
        acc.set_accrued_fees(0, 100);
        let proj = acc.project(3, 0).unwrap();
        assert_eq!(proj.checkpoint, Some((1, 0)));
    }

    #[test]
    fn skipped_cycles_share_one_checkpoint() {
        let mut acc = with_power(10);
        acc.set_accrued_fees(0, 10);
        let proj = acc.project(50, 0).unwrap();
        acc.commit(&proj);
        let one = SCALING_FACTOR;
        for k in 1..=50 {
            assert_eq!(acc.committed_acc(k), one);
        }
    }

    #[test]
    fn pending_deltas_apply_on_roll() {
        let mut acc = with_power(100);
        acc.set_pending_delta(1, 50);
        acc.set_pending_delta(2, -30);
        let proj = acc.project(1, 0).unwrap();
        assert_eq!(proj.total_power, 150);
        acc.commit(&proj);
        let proj = acc.project(5, 7).unwrap();
        assert_eq!(proj.total_power, 127);
    }

    #[test]
    fn projection_does_not_mutate() {
        let mut acc = with_power(3);
        acc.set_accrued_fees(0, 9);
        let before = acc.clone();
        let proj = acc.project(2, 1).unwrap();
        assert_eq!(acc, before);
        assert_eq!(acc.acc_at(&proj, 0), 0);
        assert_eq!(acc.acc_at(&proj, 1), 3 * SCALING_FACTOR);
        assert_eq!(acc.acc_at(&proj, 2), 3 * SCALING_FACTOR);
    }

    #[test]
    fn negative_total_is_overflow() {
        let mut acc = with_power(5);
        acc.set_pending_delta(1, -6);
        assert_eq!(acc.project(1, 0), Err(LedgerError::ArithmeticOverflow));
    }

    #[test]
    fn zero_pending_delta_is_removed() {
        let mut acc = FeeAccumulator::default();
        acc.set_pending_delta(4, 9);
        acc.set_pending_delta(4, 0);
        assert_eq!(acc, FeeAccumulator::default());
    }
}
