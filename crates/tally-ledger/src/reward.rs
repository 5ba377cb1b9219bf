//! Lazily compounded reward schedule.
//!
//! Only cycles in which the reward was actually needed are stored. Any other
//! cycle is answered by compounding forward from the nearest checkpoint at
//! or before it, so unvisited cycles still grow the emission.

use std::collections::BTreeMap;

use tally_core::constants::INITIAL_CYCLE_REWARD;
use tally_core::error::LedgerError;
use tally_core::reward::compound_reward;
use tally_core::types::Cycle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSchedule {
    checkpoints: BTreeMap<Cycle, u128>,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl RewardSchedule {
    /// Schedule seeded with `R(0) = INITIAL_CYCLE_REWARD`.
    pub fn new() -> Self {
        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(0, INITIAL_CYCLE_REWARD);
        Self { checkpoints }
    }

    /// Most recent cached `(cycle, reward)` pair.
    pub fn last_known(&self) -> (Cycle, u128) {
        self.checkpoints
            .last_key_value()
            .map(|(c, r)| (*c, *r))
            .unwrap_or((0, INITIAL_CYCLE_REWARD))
    }

    /// Reward emission of `cycle`. Does not update the cache.
    pub fn reward_at(&self, cycle: Cycle) -> Result<u128, LedgerError> {
        let (from, reward) = self
            .checkpoints
            .range(..=cycle)
            .next_back()
            .map(|(c, r)| (*c, *r))
            .unwrap_or((0, INITIAL_CYCLE_REWARD));
        compound_reward(reward, cycle - from)
    }

    /// Reward emission of `cycle`, caching it as a checkpoint.
    pub fn advance_to(&mut self, cycle: Cycle) -> Result<u128, LedgerError> {
        let reward = self.reward_at(cycle)?;
        self.checkpoints.insert(cycle, reward);
        Ok(reward)
    }

    /// Cached value stored exactly at `cycle`, if any.
    pub fn checkpoint(&self, cycle: Cycle) -> Option<u128> {
        self.checkpoints.get(&cycle).copied()
    }

    pub(crate) fn record(&mut self, cycle: Cycle, reward: u128) {
        self.checkpoints.insert(cycle, reward);
    }

    pub(crate) fn cycles(&self) -> impl Iterator<Item = Cycle> + '_ {
        self.checkpoints.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::reward::reward_for_cycle;

    #[test]
    fn genesis_reward() {
        let sched = RewardSchedule::new();
        assert_eq!(sched.reward_at(0).unwrap(), INITIAL_CYCLE_REWARD);
        assert_eq!(sched.last_known(), (0, INITIAL_CYCLE_REWARD));
    }

    #[test]
    fn advance_caches_checkpoint() {
        let mut sched = RewardSchedule::new();
        let r = sched.advance_to(5).unwrap();
        assert_eq!(r, reward_for_cycle(5).unwrap());
        assert_eq!(sched.checkpoint(5), Some(r));
        assert_eq!(sched.last_known(), (5, r));
    }

    #[test]
    fn past_cycles_compound_from_earlier_checkpoint() {
        let mut sched = RewardSchedule::new();
        sched.advance_to(10).unwrap();
        assert_eq!(sched.reward_at(3).unwrap(), reward_for_cycle(3).unwrap());
        assert_eq!(sched.checkpoint(3), None);
    }

    #[test]
    fn gaps_still_compound() {
        let mut sched = RewardSchedule::new();
        sched.advance_to(2).unwrap();
        // Nothing happened between cycle 2 and 40.
        assert_eq!(sched.advance_to(40).unwrap(), reward_for_cycle(40).unwrap());
    }
}
