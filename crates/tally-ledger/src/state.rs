//! The ledger's complete durable state and its record-level views.
//!
//! [`LedgerState`] is what persistence stores and restores. It is kept as
//! three component structs in memory and exposed per cycle as
//! [`CycleRecord`]s plus a singleton [`GlobalMeta`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tally_core::types::Cycle;

use crate::accumulator::FeeAccumulator;
use crate::positions::{Position, PositionLedger};
use crate::reward::RewardSchedule;

/// Singleton global fields.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
pub struct GlobalMeta {
    pub last_known_cycle: Cycle,
    pub total_power: u128,
}

/// Everything stored for a single cycle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
    bincode::Encode, bincode::Decode,
)]
pub struct CycleRecord {
    pub accrued_fees: u64,
    /// Accumulator checkpoint stored at this cycle.
    pub accumulator: Option<u128>,
    /// Reward checkpoint stored at this cycle.
    pub reward: Option<u128>,
    pub total_entry_power: u128,
    pub entry_stake_weight: u128,
    pub pending_power_delta: i128,
}

impl CycleRecord {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Records touched by the operations since the last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub meta: GlobalMeta,
    /// Touched cycles; an empty record means nothing is stored for it.
    pub cycles: Vec<(Cycle, CycleRecord)>,
    pub positions: Vec<Position>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty() && self.positions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub rewards: RewardSchedule,
    pub accumulator: FeeAccumulator,
    pub positions: PositionLedger,
}

impl LedgerState {
    pub fn meta(&self) -> GlobalMeta {
        GlobalMeta {
            last_known_cycle: self.accumulator.last_known_cycle(),
            total_power: self.accumulator.total_power(),
        }
    }

    pub fn cycle_record(&self, cycle: Cycle) -> CycleRecord {
        CycleRecord {
            accrued_fees: self.accumulator.accrued_fees(cycle),
            accumulator: self.accumulator.checkpoint(cycle),
            reward: self.rewards.checkpoint(cycle),
            total_entry_power: self.positions.total_entry_power(cycle),
            entry_stake_weight: self.positions.entry_stake_weight(cycle),
            pending_power_delta: self.accumulator.pending_delta(cycle),
        }
    }

    /// Every non-empty cycle record, in cycle order.
    pub fn cycle_records(&self) -> Vec<(Cycle, CycleRecord)> {
        let mut cycles: BTreeSet<Cycle> = self.positions.entry_cycles().collect();
        cycles.extend(self.accumulator.cycles());
        cycles.extend(self.rewards.cycles());
        cycles
            .into_iter()
            .map(|c| (c, self.cycle_record(c)))
            .filter(|(_, r)| !r.is_empty())
            .collect()
    }

    /// Rebuild state from stored records.
    pub fn restore(
        meta: GlobalMeta,
        cycles: impl IntoIterator<Item = (Cycle, CycleRecord)>,
        positions: impl IntoIterator<Item = Position>,
    ) -> Self {
        let mut state = Self::default();
        state
            .accumulator
            .set_last_known(meta.last_known_cycle, meta.total_power);
        for (cycle, record) in cycles {
            if record.accrued_fees > 0 {
                state.accumulator.set_accrued_fees(cycle, record.accrued_fees);
            }
            if let Some(acc) = record.accumulator {
                state.accumulator.set_checkpoint(cycle, acc);
            }
            if let Some(reward) = record.reward {
                state.rewards.record(cycle, reward);
            }
            if record.total_entry_power > 0 {
                state
                    .positions
                    .set_total_entry_power(cycle, record.total_entry_power);
            }
            if record.entry_stake_weight > 0 {
                state
                    .positions
                    .set_entry_stake_weight(cycle, record.entry_stake_weight);
            }
            state
                .accumulator
                .set_pending_delta(cycle, record.pending_power_delta);
        }
        for position in positions {
            state.positions.insert(position);
        }
        state
    }
}
