//! Reward emission schedule.
//!
//! The emission starts at [`INITIAL_CYCLE_REWARD`] and compounds by 1% per
//! elapsed cycle, whether or not the cycle saw any activity:
//!
//! - Cycle 0: 10,000
//! - Cycle 1: 10,100
//! - Cycle 2: 10,201
//! - Cycle 3: 10,303.01
//!
//! Each step floors `R(n) / 100` before adding it, so the schedule must be
//! walked one cycle at a time. Repeated squaring of a fixed-point growth
//! factor drifts from the floored sequence and is not used.

use crate::constants::{INITIAL_CYCLE_REWARD, REWARD_GROWTH_DIVISOR};
use crate::error::LedgerError;

/// One compounding step: `R(n+1) = R(n) + R(n) / 100`.
pub fn next_reward(reward: u128) -> Result<u128, LedgerError> {
    reward
        .checked_add(reward / REWARD_GROWTH_DIVISOR)
        .ok_or(LedgerError::ArithmeticOverflow)
}

/// Compound `reward` forward by `cycles` steps.
pub fn compound_reward(reward: u128, cycles: u64) -> Result<u128, LedgerError> {
    let mut r = reward;
    for _ in 0..cycles {
        r = next_reward(r)?;
    }
    Ok(r)
}

/// Reward emission of `cycle`, computed from genesis.
///
/// # Examples
///
/// ```
/// use tally_core::constants::COIN;
/// use tally_core::reward::reward_for_cycle;
/// assert_eq!(reward_for_cycle(1).unwrap(), 10_100 * COIN as u128);
/// ```
pub fn reward_for_cycle(cycle: u64) -> Result<u128, LedgerError> {
    compound_reward(INITIAL_CYCLE_REWARD, cycle)
}
