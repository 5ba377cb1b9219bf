//! Fee requirements and splits.

use crate::constants::{
    BPS_PRECISION, ENTRY_FEE_WEIGHT_DIVISOR, MIN_ENTRY_FEE, STAKE_FEE_DIVISOR,
};

/// Fee required to create a position from a deposit of `weight`.
///
/// `max(MIN_ENTRY_FEE, ceil(weight / ENTRY_FEE_WEIGHT_DIVISOR))`.
pub fn required_entry_fee(weight: u64) -> u64 {
    weight.div_ceil(ENTRY_FEE_WEIGHT_DIVISOR).max(MIN_ENTRY_FEE)
}

/// Fee required to stake `amount`: `ceil(amount / STAKE_FEE_DIVISOR)`.
///
/// Equivalent to the exact condition `fee * 1000 >= amount`.
///
/// # Examples
///
/// ```
/// use tally_core::constants::COIN;
/// use tally_core::fees::required_stake_fee;
/// assert_eq!(required_stake_fee(1_000 * COIN), COIN);
/// assert_eq!(required_stake_fee(1), 1);
/// ```
pub fn required_stake_fee(amount: u64) -> u64 {
    amount.div_ceil(STAKE_FEE_DIVISOR)
}

/// Portion of `fee` routed to the treasury at `bps` basis points.
pub fn protocol_cut(fee: u64, bps: u64) -> u64 {
    // bps <= BPS_PRECISION, so the result never exceeds `fee`.
    (fee as u128 * bps.min(BPS_PRECISION) as u128 / BPS_PRECISION as u128) as u64
}
