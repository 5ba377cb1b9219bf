//! Stake and unstake planning.
//!
//! A stake or unstake in cycle `c` changes the position's power from `c + 1`
//! only, by appending a segment there. The change to total power is
//! scheduled at `c + 1` as well, never touching the accumulator for `c` or
//! earlier. Principal staked in `c` becomes withdrawable once any later cycle
//! is observed, however many cycles were skipped in between.

use tally_core::error::LedgerError;
use tally_core::types::Cycle;

use crate::positions::{Position, PowerSegment};

/// How a planned change moves total power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerChange {
    /// Exact signed delta, scheduled at the effective cycle.
    Exact(i128),
    /// `entry_weight * amount`, added to the entry cycle's stake weight because
    /// the base power is not known yet.
    EntryWeighted(u128),
}

/// Validated stake state of a position after a stake or unstake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakePlan {
    pub staked_amount: u64,
    pub withdrawable_stake: u64,
    pub maturing_stake: u64,
    pub maturing_since: Cycle,
    pub segment: PowerSegment,
    pub change: PowerChange,
}

impl StakePlan {
    pub fn effective_cycle(&self) -> Cycle {
        self.segment.from_cycle
    }

    /// Write the plan into `position`.
    pub fn apply(&self, position: &mut Position, cycle: Cycle) {
        position.staked_amount = self.staked_amount;
        position.withdrawable_stake = self.withdrawable_stake;
        position.maturing_stake = self.maturing_stake;
        position.maturing_since = self.maturing_since;
        position.last_stake_change_cycle = Some(cycle);
        position.push_segment(self.segment);
    }
}

/// Signed power difference between two segments of the same position.
pub fn power_change(base: u128, from: &PowerSegment, to: &PowerSegment) -> Result<i128, LedgerError> {
    let before = i128::try_from(from.power(base)?).map_err(|_| LedgerError::ArithmeticOverflow)?;
    let after = i128::try_from(to.power(base)?).map_err(|_| LedgerError::ArithmeticOverflow)?;
    after.checked_sub(before).ok_or(LedgerError::ArithmeticOverflow)
}

fn next_cycle(cycle: Cycle) -> Result<Cycle, LedgerError> {
    cycle.checked_add(1).ok_or(LedgerError::ArithmeticOverflow)
}

/// Plan staking `amount` more into `position` during `cycle`.
pub fn plan_stake(
    position: &Position,
    base: Option<u128>,
    amount: u64,
    cycle: Cycle,
) -> Result<StakePlan, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount("stake amount must be positive".into()));
    }
    let staked_amount = position
        .staked_amount
        .checked_add(amount)
        .ok_or_else(|| LedgerError::InvalidAmount("stake exceeds limit".into()))?;

    let withdrawable_stake = position.withdrawable_at(cycle);
    let carried = if position.maturing_since < cycle { 0 } else { position.maturing_stake };
    let maturing_stake = carried
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticOverflow)?;

    let current = position.latest_segment();
    let segment = PowerSegment {
        from_cycle: next_cycle(cycle)?,
        staked: staked_amount,
        redeemed: current.redeemed,
    };
    let change = match base {
        Some(base) => PowerChange::Exact(power_change(base, &current, &segment)?),
        None => PowerChange::EntryWeighted(
            (position.entry_weight as u128)
                .checked_mul(amount as u128)
                .ok_or(LedgerError::ArithmeticOverflow)?,
        ),
    };

    Ok(StakePlan {
        staked_amount,
        withdrawable_stake,
        maturing_stake,
        maturing_since: cycle,
        segment,
        change,
    })
}

/// Plan withdrawing `amount` of principal from `position` during `cycle`.
pub fn plan_unstake(
    position: &Position,
    base: Option<u128>,
    amount: u64,
    cycle: Cycle,
) -> Result<StakePlan, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount("unstake amount must be positive".into()));
    }
    let withdrawable = position.withdrawable_at(cycle);
    if amount > withdrawable {
        return Err(LedgerError::InvalidAmount(format!(
            "unstake {amount} exceeds withdrawable {withdrawable}"
        )));
    }
    // Withdrawable principal implies the entry cycle has ended.
    let base = base.ok_or(LedgerError::EntryCyclePending(position.entry_cycle))?;

    let (maturing_stake, maturing_since) = if position.maturing_since < cycle {
        (0, cycle)
    } else {
        (position.maturing_stake, position.maturing_since)
    };
    let current = position.latest_segment();
    let segment = PowerSegment {
        from_cycle: next_cycle(cycle)?,
        staked: position.staked_amount - amount,
        redeemed: current.redeemed,
    };

    Ok(StakePlan {
        staked_amount: position.staked_amount - amount,
        withdrawable_stake: withdrawable - amount,
        maturing_stake,
        maturing_since,
        change: PowerChange::Exact(power_change(base, &current, &segment)?),
        segment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_core::constants::STAKE_UNIT;
    use tally_core::types::{DepositId, PositionId};

    fn position(cycle: Cycle) -> Position {
        Position::new(PositionId(1), DepositId(1), cycle, 7, false)
    }

    #[test]
    fn zero_amounts_rejected() {
        let p = position(0);
        assert!(matches!(plan_stake(&p, Some(1), 0, 0), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(plan_unstake(&p, Some(1), 0, 1), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn stake_schedules_next_cycle() {
        let p = position(0);
        let plan = plan_stake(&p, Some(1_000), STAKE_UNIT, 2).unwrap();
        assert_eq!(plan.effective_cycle(), 3);
        assert_eq!(plan.change, PowerChange::Exact(1_000));
        assert_eq!(plan.withdrawable_stake, 0);
        assert_eq!(plan.maturing_stake, STAKE_UNIT);
    }

    #[test]
    fn entry_cycle_stake_is_weighted() {
        let p = position(0);
        let plan = plan_stake(&p, None, 100, 0).unwrap();
        assert_eq!(plan.change, PowerChange::EntryWeighted(700));
    }

    #[test]
    fn stakes_within_cycle_accumulate() {
        let mut p = position(0);
        let first = plan_stake(&p, Some(1_000), 10, 4).unwrap();
        first.apply(&mut p, 4);
        let second = plan_stake(&p, Some(1_000), 15, 4).unwrap();
        second.apply(&mut p, 4);
        assert_eq!(p.staked_amount, 25);
        assert_eq!(p.maturing_stake, 25);
        assert_eq!(p.segments.len(), 2);
        assert_eq!(p.latest_segment().staked, 25);
    }

    #[test]
    fn earlier_stake_matures_on_new_stake() {
        let mut p = position(0);
        plan_stake(&p, Some(1_000), 10, 1).unwrap().apply(&mut p, 1);
        let plan = plan_stake(&p, Some(1_000), 5, 6).unwrap();
        assert_eq!(plan.withdrawable_stake, 10);
        assert_eq!(plan.maturing_stake, 5);
        assert_eq!(plan.maturing_since, 6);
    }

    #[test]
    fn unstake_limited_to_withdrawable() {
        let mut p = position(0);
        plan_stake(&p, Some(1_000), 10, 1).unwrap().apply(&mut p, 1);
        assert!(plan_unstake(&p, Some(1_000), 1, 1).is_err());
        assert!(plan_unstake(&p, Some(1_000), 11, 2).is_err());
        let plan = plan_unstake(&p, Some(1_000), 4, 2).unwrap();
        assert_eq!(plan.staked_amount, 6);
        assert_eq!(plan.withdrawable_stake, 6);
        assert_eq!(plan.maturing_stake, 0);
        assert_eq!(plan.effective_cycle(), 3);
    }

    #[test]
    fn unstake_keeps_same_cycle_maturing_stake() {
        let mut p = position(0);
        plan_stake(&p, Some(1_000), 10, 1).unwrap().apply(&mut p, 1);
        plan_stake(&p, Some(1_000), 3, 5).unwrap().apply(&mut p, 5);
        let plan = plan_unstake(&p, Some(1_000), 10, 5).unwrap();
        assert_eq!(plan.withdrawable_stake, 0);
        assert_eq!(plan.maturing_stake, 3);
        assert_eq!(plan.maturing_since, 5);
        assert_eq!(plan.staked_amount, 3);
    }

    #[test]
    fn power_change_is_signed() {
        let a = PowerSegment { from_cycle: 0, staked: STAKE_UNIT, redeemed: false };
        let b = PowerSegment { from_cycle: 1, staked: 0, redeemed: false };
        assert_eq!(power_change(10, &a, &b).unwrap(), -10);
        assert_eq!(power_change(10, &b, &a).unwrap(), 10);
    }

    proptest! {
        /// Principal is always either withdrawable or maturing, and all of it
        /// is withdrawable once a later cycle is seen.
        #[test]
        fn principal_splits_and_matures(
            moves in prop::collection::vec((0u64..4, 1u64..3 * STAKE_UNIT, any::<bool>()), 1..30)
        ) {
            let mut p = position(0);
            let mut cycle = 1;
            for (gap, amount, withdraw) in moves {
                cycle += gap;
                let withdrawable = p.withdrawable_at(cycle);
                let plan = if withdraw && withdrawable > 0 {
                    plan_unstake(&p, Some(1_000), amount % withdrawable + 1, cycle).unwrap()
                } else {
                    plan_stake(&p, Some(1_000), amount, cycle).unwrap()
                };
                plan.apply(&mut p, cycle);
                prop_assert_eq!(p.withdrawable_stake + p.maturing_stake, p.staked_amount);
                prop_assert_eq!(p.latest_segment().staked, p.staked_amount);
                prop_assert_eq!(p.latest_segment().from_cycle, cycle + 1);
            }
            prop_assert_eq!(p.withdrawable_at(cycle + 1), p.staked_amount);
        }

        /// The scheduled delta moves power from the old segment to the new one.
        #[test]
        fn stake_delta_matches_segment_power(
            base in 1u128..1_000_000_000_000,
            first in 1u64..5 * STAKE_UNIT,
            second in 1u64..5 * STAKE_UNIT,
        ) {
            let mut p = position(0);
            plan_stake(&p, Some(base), first, 1).unwrap().apply(&mut p, 1);
            let before = p.latest_segment().power(base).unwrap();
            let plan = plan_stake(&p, Some(base), second, 3).unwrap();
            let after = plan.segment.power(base).unwrap();
            prop_assert_eq!(plan.change, PowerChange::Exact(after as i128 - before as i128));
            prop_assert!(after >= before);
        }
    }
}
