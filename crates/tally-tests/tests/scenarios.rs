//! End-to-end economic scenarios driven through the ledger's boundary
//! operations.
//!
//! Each scenario runs on a fresh [`Harness`]: in-memory collaborators, a
//! manual clock starting at genesis, and one-day cycles.

use tally_core::constants::{COIN, INITIAL_CYCLE_REWARD, MIN_BASE_POWER, MIN_ENTRY_FEE, STAKE_UNIT};
use tally_core::error::LedgerError;
use tally_core::fees::required_stake_fee;
use tally_core::types::{LedgerEvent, PositionId};
use tally_tests::helpers::*;

const R0: u128 = INITIAL_CYCLE_REWARD;

/// Pool share of a minimum entry fee after the treasury cut.
const ENTRY_POOL: u64 = 97_500;

// ---------------------------------------------------------------------------
// Reward schedule
// ---------------------------------------------------------------------------

#[test]
fn reward_compounds_over_five_active_cycles() {
    let mut h = Harness::new();
    let expected = [
        10_000 * COIN as u128,
        10_100 * COIN as u128,
        10_201 * COIN as u128,
        1_030_301_000_000,
        1_040_604_010_000,
    ];
    for (cycle, reward) in expected.iter().enumerate() {
        h.enter(account(1), 1_000);
        assert_eq!(h.ledger.current_cycle(), cycle as u64);
        assert_eq!(h.ledger.reward_at(cycle as u64).unwrap(), *reward);
        h.advance(1);
    }
}

#[test]
fn reward_compounds_through_inactive_cycles() {
    let mut h = Harness::new();
    h.enter(account(1), 1_000);
    h.advance(40);
    h.enter(account(2), 1_000);

    let mut reward = R0;
    for cycle in 0..60 {
        assert_eq!(h.ledger.reward_at(cycle).unwrap(), reward, "cycle {cycle}");
        reward += reward / 100;
    }
}

#[test]
fn late_entrant_receives_grown_reward() {
    let mut h = Harness::new();
    h.advance(2);
    let id = h.enter(account(1), 1_000);
    h.advance(1);
    assert_eq!(h.ledger.base_power(id).unwrap(), Some(1_020_100_000_000));
}

// ---------------------------------------------------------------------------
// Base power resolution
// ---------------------------------------------------------------------------

#[test]
fn entrants_split_reward_by_weight() {
    let mut h = Harness::new();
    let a = h.enter(account(1), 1_000);
    let b = h.enter(account(2), 3_000);
    h.advance(1);
    assert_eq!(h.ledger.base_power(a).unwrap(), Some(R0 / 4));
    assert_eq!(h.ledger.base_power(b).unwrap(), Some(3 * R0 / 4));
    assert_eq!(h.claim(account(1), a), 2 * ENTRY_POOL / 4);
    assert_eq!(h.claim(account(2), b), 3 * 2 * ENTRY_POOL / 4);
}

#[test]
fn base_power_unresolved_during_entry_cycle() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    assert_eq!(h.ledger.base_power(id).unwrap(), None);
    assert_eq!(h.ledger.current_power(id).unwrap(), None);
    assert_eq!(h.ledger.position(id).unwrap().base_power, None);

    // Reads resolve without storing; the next write stores it.
    h.advance(1);
    assert_eq!(h.ledger.base_power(id).unwrap(), Some(R0));
    assert_eq!(h.ledger.position(id).unwrap().base_power, None);
    h.stake(account(1), id, 10);
    assert_eq!(h.ledger.position(id).unwrap().base_power, Some(R0));
}

// ---------------------------------------------------------------------------
// Staking and the one-cycle lag
// ---------------------------------------------------------------------------

#[test]
fn stake_unit_in_entry_cycle_doubles_power() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    h.stake(account(1), id, STAKE_UNIT);
    h.advance(1);
    let base = h.ledger.base_power(id).unwrap().unwrap();
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(2 * base));
    assert_eq!(h.ledger.total_power().unwrap(), 2 * base);
}

#[test]
fn stake_does_not_change_power_in_its_own_cycle() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    h.advance(1);
    let before = h.ledger.total_power().unwrap();
    h.stake(account(1), id, STAKE_UNIT);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(R0));
    assert_eq!(h.ledger.total_power().unwrap(), before);
    h.advance(1);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(2 * R0));
}

#[test]
fn late_stake_cannot_capture_current_cycle_fees() {
    let mut h = Harness::new();
    let a = h.enter(account(1), 1_000);
    let b = h.enter(account(2), 1_000);
    h.advance(1);
    // Staking at the end of cycle 1 must not raise b's share of cycle 1.
    h.stake(account(2), b, STAKE_UNIT);
    h.advance(1);
    let c = h.enter(account(3), 1_000);

    let stake_fee = required_stake_fee(STAKE_UNIT);
    assert_eq!(h.claim(account(1), a), ENTRY_POOL + stake_fee / 2);
    assert_eq!(h.claim(account(2), b), ENTRY_POOL + stake_fee / 2);

    h.advance(1);
    // Cycle 2 total power: R0 / 2 + R0 (b doubled) + R(2) (c's entry).
    assert_eq!(h.claim(account(1), a), 19_344);
    assert_eq!(h.claim(account(2), b), 38_688);
    assert_eq!(h.claim(account(3), c), 39_466);
}

#[test]
fn stakes_within_a_cycle_accumulate() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    h.advance(1);
    h.stake(account(1), id, STAKE_UNIT / 2);
    h.stake(account(1), id, STAKE_UNIT / 2);
    let position = h.ledger.position(id).unwrap();
    assert_eq!(position.staked_amount, STAKE_UNIT);
    assert_eq!(position.segments.len(), 2);
    h.advance(1);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(2 * R0));
    assert_eq!(h.ledger.withdrawable_stake(id).unwrap(), STAKE_UNIT);
}

#[test]
fn partial_unstake_returns_principal() {
    let mut h = Harness::new();
    let owner = account(1);
    let id = h.enter(owner, 1_000);
    h.advance(1);
    h.stake(owner, id, 2 * STAKE_UNIT);
    h.advance(1);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(3 * R0));

    h.try_unstake(owner, id, STAKE_UNIT).unwrap();
    assert_eq!(h.world.stake_balance(&owner), STAKE_UNIT);
    assert_eq!(h.ledger.withdrawable_stake(id).unwrap(), STAKE_UNIT);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(3 * R0));
    h.advance(1);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(2 * R0));

    h.try_unstake(owner, id, STAKE_UNIT).unwrap();
    assert_eq!(h.world.stake_balance(&owner), 2 * STAKE_UNIT);
    assert_eq!(h.world.stake_escrow(), 0);
    assert_eq!(h.ledger.position(id).unwrap().staked_amount, 0);
}

#[test]
fn unstake_more_than_withdrawable_rejected() {
    let mut h = Harness::new();
    let owner = account(1);
    let id = h.enter(owner, 1_000);
    h.advance(1);
    h.stake(owner, id, STAKE_UNIT);
    h.advance(1);
    h.stake(owner, id, STAKE_UNIT);
    // Only the first stake has matured.
    assert_eq!(h.ledger.withdrawable_stake(id).unwrap(), STAKE_UNIT);
    assert!(matches!(
        h.try_unstake(owner, id, STAKE_UNIT + 1),
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(h.try_unstake(owner, id, 0), Err(LedgerError::InvalidAmount(_))));
    h.try_unstake(owner, id, STAKE_UNIT).unwrap();
}

// ---------------------------------------------------------------------------
// Skipped cycles
// ---------------------------------------------------------------------------

#[test]
fn unstake_across_inactive_cycles_matches_visited_cycles() {
    fn run(visit_every_cycle: bool) -> Harness {
        let mut h = Harness::new();
        let owner = account(1);
        let id = h.enter(owner, 1_000);
        h.enter(account(2), 1_000);
        h.advance(1);
        h.stake(owner, id, 3 * STAKE_UNIT);
        for _ in 0..3 {
            h.advance(1);
            if visit_every_cycle {
                h.ledger.roll_forward().unwrap();
            }
        }
        h.try_unstake(owner, id, STAKE_UNIT).unwrap();
        for _ in 0..4 {
            h.advance(1);
            if visit_every_cycle {
                h.ledger.roll_forward().unwrap();
            }
        }
        h.enter(account(3), 5_000);
        h.advance(1);
        h
    }

    let skipped = run(false);
    let visited = run(true);
    let id = PositionId(1);
    let cycle = skipped.ledger.current_cycle();
    assert_eq!(cycle, visited.ledger.current_cycle());
    assert_eq!(
        skipped.ledger.withdrawable_stake(id).unwrap(),
        visited.ledger.withdrawable_stake(id).unwrap()
    );
    assert_eq!(skipped.ledger.withdrawable_stake(id).unwrap(), 2 * STAKE_UNIT);
    assert_eq!(
        skipped.ledger.total_power().unwrap(),
        visited.ledger.total_power().unwrap()
    );
    for c in 0..=cycle {
        assert_eq!(
            skipped.ledger.fees_per_power_accumulator(c).unwrap(),
            visited.ledger.fees_per_power_accumulator(c).unwrap(),
            "accumulator at cycle {c}"
        );
    }
    for id in 1..=3 {
        assert_eq!(
            skipped.ledger.claimable_fees(PositionId(id)).unwrap(),
            visited.ledger.claimable_fees(PositionId(id)).unwrap()
        );
    }
}

#[test]
fn stake_matures_after_many_skipped_cycles() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    h.advance(1);
    h.stake(account(1), id, STAKE_UNIT);
    h.advance(100);
    assert_eq!(h.ledger.withdrawable_stake(id).unwrap(), STAKE_UNIT);
    h.try_unstake(account(1), id, STAKE_UNIT).unwrap();
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[test]
fn equal_entrants_each_claim_half() {
    let mut h = Harness::new();
    let a = h.enter(account(1), 1_000);
    let b = h.enter(account(2), 1_000);
    h.advance(1);
    let claim = h.ledger.claimable_fees(a).unwrap();
    assert_eq!(claim.entry_share, ENTRY_POOL as u128);
    assert_eq!(claim.post_entry_share, 0);
    assert_eq!(h.claim(account(1), a), ENTRY_POOL);
    assert_eq!(h.claim(account(2), b), ENTRY_POOL);
}

#[test]
fn second_claim_in_same_cycle_is_empty() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    h.advance(1);
    h.claim(account(1), id);
    let before = h.ledger.state().clone();
    assert_eq!(h.try_claim(account(1), id), Err(LedgerError::NothingToClaim(id.0)));
    assert_eq!(h.ledger.state(), &before);
    assert_eq!(h.ledger.claimable_fees(id).unwrap().total().unwrap(), 0);
}

#[test]
fn claim_splits_at_each_power_change() {
    let mut h = Harness::new();
    let owner = account(1);
    let a = h.enter(owner, 1_000);
    let b = h.enter(account(2), 1_000);
    h.claim(owner, a);
    h.advance(1);
    // a: R0/2 in cycle 1, R0 in cycle 2, R0/2 again from cycle 3.
    h.stake(owner, a, STAKE_UNIT);
    h.enter(account(3), 1_000);
    h.advance(1);
    h.enter(account(4), 1_000);
    h.try_unstake(owner, a, STAKE_UNIT).unwrap();
    h.advance(1);
    h.enter(account(5), 1_000);
    h.advance(1);

    let claim = h.ledger.claimable_fees(a).unwrap();
    assert_eq!(claim.entry_share, ENTRY_POOL as u128);
    assert_eq!(claim.through_cycle, Some(3));

    let acc = |c| h.ledger.fees_per_power_accumulator(c).unwrap();
    let half = R0 / 2;
    let expected = half * (acc(2) - acc(1)) / 1_000_000_000_000_000_000
        + 2 * half * (acc(3) - acc(2)) / 1_000_000_000_000_000_000
        + half * (acc(4) - acc(3)) / 1_000_000_000_000_000_000;
    assert_eq!(claim.post_entry_share, expected);
    assert!(h.claim(owner, a) > 0);
    assert!(h.claim(account(2), b) > 0);
}

#[test]
fn claims_only_cover_elapsed_cycles() {
    let mut h = Harness::new();
    let id = h.enter(account(1), 1_000);
    h.advance(1);
    h.enter(account(2), 1_000);
    // Cycle 1 fees are not claimable until cycle 1 ends.
    assert_eq!(h.claim(account(1), id), ENTRY_POOL);
    assert_eq!(h.claim(account(1), id), 0);
    h.advance(1);
    assert!(h.claim(account(1), id) > 0);
}

// ---------------------------------------------------------------------------
// Fees, refunds, redemption
// ---------------------------------------------------------------------------

#[test]
fn overpayment_refunded_and_treasury_paid() {
    let mut h = Harness::new();
    let owner = account(1);
    let deposit = h.world.mint_deposit(owner, 1_000, 0);
    h.world.fund_fees(&owner, MIN_ENTRY_FEE + 1_234);
    let id = h
        .ledger
        .create_position(&owner, deposit, MIN_ENTRY_FEE + 1_234)
        .unwrap();
    assert_eq!(h.world.fee_balance(&owner), 1_234);
    assert_eq!(h.world.fee_balance(&TREASURY), MIN_ENTRY_FEE - ENTRY_POOL);

    h.advance(1);
    h.world.fund_stake(&owner, STAKE_UNIT);
    h.world.fund_fees(&owner, required_stake_fee(STAKE_UNIT) + 7 - 1_234);
    h.ledger
        .stake(&owner, id, STAKE_UNIT, required_stake_fee(STAKE_UNIT) + 7)
        .unwrap();
    assert_eq!(h.world.fee_balance(&owner), 1_234 + 7);
    assert_eq!(h.world.fee_escrow(), ENTRY_POOL + required_stake_fee(STAKE_UNIT));
    // Stake fees go entirely to the pool.
    assert_eq!(h.ledger.cycle_accrued_fees(1), required_stake_fee(STAKE_UNIT));
    assert_eq!(h.world.fee_balance(&TREASURY), MIN_ENTRY_FEE - ENTRY_POOL);
}

#[test]
fn overpayment_beyond_balance_rejected() {
    let mut h = Harness::new();
    let owner = account(1);
    let deposit = h.world.mint_deposit(owner, 1_000, 0);
    h.world.fund_fees(&owner, MIN_ENTRY_FEE);
    let before = h.world.snapshot();
    assert_eq!(
        h.ledger.create_position(&owner, deposit, MIN_ENTRY_FEE + 1_000_000),
        Err(LedgerError::InsufficientFeeBalance {
            have: MIN_ENTRY_FEE,
            need: MIN_ENTRY_FEE + 1_000_000
        })
    );
    assert_eq!(h.world.snapshot(), before);
    assert_eq!(h.world.fee_balance(&TREASURY), 0);
    assert_eq!(h.ledger.cycle_accrued_fees(0), 0);

    let id = h.enter(owner, 1_000);
    h.advance(1);
    h.world.fund_stake(&owner, STAKE_UNIT);
    let stake_fee = required_stake_fee(STAKE_UNIT);
    assert_eq!(
        h.ledger.stake(&owner, id, STAKE_UNIT, stake_fee + 500),
        Err(LedgerError::InsufficientFeeBalance {
            have: MIN_ENTRY_FEE,
            need: stake_fee + 500
        })
    );
    assert_eq!(h.world.stake_balance(&owner), STAKE_UNIT);
    assert_eq!(h.world.fee_balance(&owner), MIN_ENTRY_FEE);
}

#[test]
fn insufficient_stake_fee_rejected() {
    let mut h = Harness::new();
    let owner = account(1);
    let id = h.enter(owner, 1_000);
    h.advance(1);
    h.world.fund_stake(&owner, 1_001);
    assert_eq!(
        h.ledger.stake(&owner, id, 1_001, 1),
        Err(LedgerError::InsufficientFee { paid: 1, required: 2 })
    );
    assert_eq!(h.world.stake_balance(&owner), 1_001);
}

#[test]
fn redemption_keeps_stake_multiplier_on_min_power() {
    let mut h = Harness::new();
    let owner = account(1);
    let id = h.enter(owner, 1_000);
    h.advance(1);
    h.stake(owner, id, STAKE_UNIT);
    h.try_redeem(owner, id).unwrap();
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(R0));
    h.advance(1);
    assert_eq!(h.ledger.current_power(id).unwrap(), Some(2 * MIN_BASE_POWER));
    assert_eq!(h.ledger.total_power().unwrap(), 2 * MIN_BASE_POWER);
    assert!(matches!(
        h.events.last(),
        Some(LedgerEvent::DepositRedeemed { effective_cycle: 2, .. })
    ));
}

#[test]
fn transferred_position_pays_new_owner() {
    let mut h = Harness::new();
    let (alice, bob) = (account(1), account(2));
    let id = h.enter(alice, 1_000);
    h.world.transfer_position(id, &alice, bob).unwrap();
    h.advance(1);
    assert!(matches!(h.try_claim(alice, id), Err(LedgerError::NotOwner(_))));
    assert_eq!(h.claim(bob, id), ENTRY_POOL);
    assert_eq!(h.world.fee_balance(&bob), ENTRY_POOL);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn failed_operations_leave_state_identical() {
    let mut h = Harness::new();
    let (alice, bob) = (account(1), account(2));
    let id = h.enter(alice, 1_000);
    h.advance(3);

    let state = h.ledger.state().clone();
    let world = h.world.snapshot();
    let events = h.events.len();

    assert!(matches!(h.try_stake(bob, id, 10), Err(LedgerError::NotOwner(_))));
    assert!(matches!(h.try_unstake(alice, id, 1), Err(LedgerError::InvalidAmount(_))));
    assert_eq!(h.try_claim(alice, PositionId(99)), Err(LedgerError::UnknownPosition(99)));
    assert!(matches!(h.try_redeem(bob, id), Err(LedgerError::NotOwner(_))));

    // try_stake funded bob before failing; only that funding differs.
    let mut expected_world = world;
    *expected_world.stake_balances.entry(bob).or_default() += 10;
    *expected_world.fee_balances.entry(bob).or_default() += required_stake_fee(10);
    assert_eq!(h.ledger.state(), &state);
    assert_eq!(h.world.snapshot(), expected_world);
    assert_eq!(h.events.len(), events);
    assert_eq!(h.ledger.state().accumulator.last_known_cycle(), 0);
}
