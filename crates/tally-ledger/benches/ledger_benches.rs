//! Criterion benchmarks for the ledger engine.
//!
//! Covers: position entry, roll-forward across long gaps, and claims over
//! many power segments.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tally_core::constants::STAKE_UNIT;
use tally_core::fees::{required_entry_fee, required_stake_fee};
use tally_core::types::{AccountId, PositionId};
use tally_ledger::{Ledger, LedgerParams, ManualClock, MemoryWorld};

const DAY: i64 = 86_400;

fn setup() -> (Ledger, Arc<MemoryWorld>, Arc<ManualClock>) {
    let world = Arc::new(MemoryWorld::new());
    let params = LedgerParams::default();
    let clock = Arc::new(ManualClock::new(params.genesis_time));
    let ledger = Ledger::new(params, clock.clone(), world.collaborators());
    (ledger, world, clock)
}

fn enter(ledger: &mut Ledger, world: &MemoryWorld, owner: AccountId, weight: u64) -> PositionId {
    let deposit = world.mint_deposit(owner, weight, 0);
    let fee = required_entry_fee(weight);
    world.fund_fees(&owner, fee);
    ledger.create_position(&owner, deposit, fee).unwrap()
}

fn bench_create_position(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    c.bench_function("create_100_positions", |b| {
        b.iter_batched(
            setup,
            |(mut ledger, world, _clock)| {
                for i in 0..100u8 {
                    let weight = rng.gen_range(1..1_000_000_000u64);
                    enter(&mut ledger, &world, AccountId([i; 20]), weight);
                }
                black_box(ledger.total_power().unwrap())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_roll_forward(c: &mut Criterion) {
    c.bench_function("roll_forward_365_cycles", |b| {
        b.iter_batched(
            || {
                let (mut ledger, world, clock) = setup();
                enter(&mut ledger, &world, AccountId([1; 20]), 1_000);
                clock.advance(365 * DAY);
                (ledger, clock)
            },
            |(mut ledger, _clock)| black_box(ledger.roll_forward().unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_claim_segments(c: &mut Criterion) {
    let owner = AccountId([1; 20]);
    let (mut ledger, world, clock) = setup();
    let id = enter(&mut ledger, &world, owner, 1_000);
    world.fund_stake(&owner, 100 * STAKE_UNIT);
    world.fund_fees(&owner, 100 * required_stake_fee(STAKE_UNIT));
    for _ in 0..100 {
        clock.advance(DAY);
        ledger
            .stake(&owner, id, STAKE_UNIT, required_stake_fee(STAKE_UNIT))
            .unwrap();
    }
    clock.advance(DAY);

    c.bench_function("claimable_100_segments", |b| {
        b.iter(|| black_box(ledger.claimable_fees(id).unwrap()))
    });
}

criterion_group!(benches, bench_create_position, bench_roll_forward, bench_claim_segments);
criterion_main!(benches);
