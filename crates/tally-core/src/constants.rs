//! Protocol constants. Token and fee amounts are in base units
//! (1 whole unit = 10^8 base units). Power values are `u128`.

/// Base units per whole token (applies to both the stake token and the fee currency).
pub const COIN: u64 = 100_000_000;

/// Reward emission of cycle 0, in power units.
///
/// # Examples
///
/// ```
/// use tally_core::constants::{COIN, INITIAL_CYCLE_REWARD};
/// assert_eq!(INITIAL_CYCLE_REWARD, 10_000 * COIN as u128);
/// ```
pub const INITIAL_CYCLE_REWARD: u128 = 10_000 * COIN as u128;

/// Per-cycle growth divisor: `R(n+1) = R(n) + R(n) / REWARD_GROWTH_DIVISOR`.
pub const REWARD_GROWTH_DIVISOR: u128 = 100;

/// Fixed-point denominator of the fees-per-power accumulator.
pub const SCALING_FACTOR: u128 = 1_000_000_000_000_000_000;

/// Staked amount that doubles a position's base power.
pub const STAKE_UNIT: u64 = 1_000 * COIN;

/// Stake fee is `amount / STAKE_FEE_DIVISOR`, rounded up.
pub const STAKE_FEE_DIVISOR: u64 = 1_000;

/// Floor on the fee for creating a position (0.001 of the fee currency).
pub const MIN_ENTRY_FEE: u64 = COIN / 1_000;

/// Entry fee grows by one base unit per this much deposit weight.
pub const ENTRY_FEE_WEIGHT_DIVISOR: u64 = 1_000_000;

/// Share of each entry fee routed to the treasury, in basis points (2.5%).
pub const PROTOCOL_FEE_BPS: u64 = 250;

/// Basis-point denominator.
pub const BPS_PRECISION: u64 = 10_000;

/// Base power of a position whose deposit has been redeemed.
pub const MIN_BASE_POWER: u128 = COIN as u128;

/// Default cycle length: one day.
pub const DEFAULT_CYCLE_LENGTH_SECS: u64 = 86_400;

/// Default genesis: 2025-01-01T00:00:00Z.
pub const DEFAULT_GENESIS_TIME: i64 = 1_735_689_600;

/// Default TCP port for the JSON-RPC server.
pub const DEFAULT_RPC_PORT: u16 = 18_640;
